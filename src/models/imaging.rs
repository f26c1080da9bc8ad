//! 图像数据模型

use serde::Serialize;

/// 灰度像素缓冲（每像素一个字节）
///
/// 由图像管线产生，识别一次后即丢弃。
#[derive(Debug, Clone)]
pub struct GrayBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            data,
            width,
            height,
        }
    }

    #[inline]
    pub fn at(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

/// 归一化浮点张量，逻辑形状 [1, 1, H, W]
///
/// 每次识别构建一个，用完即弃。
#[derive(Debug, Clone, Serialize)]
pub struct Tensor {
    pub dims: [usize; 4],
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(height: u32, width: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), (height * width) as usize);
        Self {
            dims: [1, 1, height as usize, width as usize],
            data,
        }
    }
}

/// 识别结果
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: Option<f32>,
}
