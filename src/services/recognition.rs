//! 识别引擎 - 业务能力层
//!
//! 构建张量、调用一次外部推理、把输出索引序列解码成文本。
//! 解码是贪心的 CTC 风格：丢弃无效槽位，折叠连续重复字符。

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use crate::error::{AppError, RecognitionError};
use crate::models::imaging::{GrayBuffer, RecognitionResult, Tensor};
use crate::services::image_pipeline::ImagePipeline;
use crate::services::ocr_runtime::OcrRuntime;

/// 模型输入高度固定为 64，宽度按原始宽高比推出
const TARGET_HEIGHT: u32 = 64;

/// 识别引擎
pub struct RecognitionEngine {
    runtime: Arc<dyn OcrRuntime>,
    charset: Vec<String>,
}

impl RecognitionEngine {
    pub fn new(runtime: Arc<dyn OcrRuntime>, charset: Vec<String>) -> Result<Self> {
        if charset.is_empty() {
            return Err(AppError::Recognition(RecognitionError::CharsetEmpty).into());
        }
        Ok(Self { runtime, charset })
    }

    /// 识别一张灰度图
    pub async fn recognize(&self, gray: &GrayBuffer) -> Result<RecognitionResult> {
        let started = Instant::now();
        let tensor = self.make_tensor(gray)?;
        debug!(
            "🧮 推理中 (输入: 1x1x{}x{})",
            tensor.dims[2], tensor.dims[3]
        );

        let indices = self.runtime.infer(&tensor).await?;
        let text = self.decode(&indices);
        info!(
            "解码完成: {} ({} 字符, 耗时 {} ms)",
            text,
            text.chars().count(),
            started.elapsed().as_millis()
        );

        Ok(RecognitionResult {
            text,
            confidence: None,
        })
    }

    /// 缩放 + 归一化，得到 [1,1,64,W] 张量
    fn make_tensor(&self, gray: &GrayBuffer) -> Result<Tensor> {
        if gray.width == 0 || gray.height == 0 {
            return Err(AppError::Image(crate::error::ImageError::EmptyImage {
                width: gray.width,
                height: gray.height,
            })
            .into());
        }
        let (target_width, target_height) = target_size(gray.width, gray.height);
        debug!(
            "🔄 调整尺寸: {}x{} -> {}x{}",
            gray.width, gray.height, target_width, target_height
        );
        let resized = ImagePipeline::resize(gray, target_width, target_height);
        let normalized = ImagePipeline::normalize(&resized);
        Ok(Tensor::new(target_height, target_width, normalized))
    }

    /// 贪心 CTC 风格解码
    ///
    /// - 索引 <= 0 或超出字符集范围的槽位直接跳过
    /// - 与上一个"已输出"字符相同的字符被折叠（不是比较原始索引）
    /// - 不做长度或拼写校验，空结果原样返回
    pub fn decode(&self, indices: &[i64]) -> String {
        let mut text = String::new();
        let mut last_char: Option<&str> = None;

        for &idx in indices {
            if idx <= 0 || idx as usize >= self.charset.len() {
                continue;
            }
            let ch = self.charset[idx as usize].as_str();
            if ch.is_empty() {
                continue;
            }
            if last_char == Some(ch) {
                continue;
            }
            text.push_str(ch);
            last_char = Some(ch);
        }

        text
    }

    pub fn charset_len(&self) -> usize {
        self.charset.len()
    }
}

/// 目标尺寸：高固定 64，宽 = floor(w * 64 / h)，至少为 1
fn target_size(width: u32, height: u32) -> (u32, u32) {
    let target_width = (width as f64 * (TARGET_HEIGHT as f64 / height as f64)).floor() as u32;
    (target_width.max(1), TARGET_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoopRuntime;

    #[async_trait]
    impl OcrRuntime for NoopRuntime {
        async fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }
        async fn load_model(&self, _model: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn infer(&self, _tensor: &Tensor) -> Result<Vec<i64>> {
            Ok(Vec::new())
        }
    }

    fn engine(charset: &[&str]) -> RecognitionEngine {
        RecognitionEngine::new(
            Arc::new(NoopRuntime),
            charset.iter().map(|c| c.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_charset_is_rejected() {
        let result = RecognitionEngine::new(Arc::new(NoopRuntime), Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_collapses_repeats() {
        // 索引 1,1,2,2,2,3 映射到 a,a,b,b,b,c，折叠后是 abc
        let engine = engine(&["", "a", "b", "c"]);
        assert_eq!(engine.decode(&[1, 1, 2, 2, 2, 3]), "abc");
    }

    #[test]
    fn test_decode_skips_invalid_indices() {
        // 4 项字符集的有效范围是 1..=3，其余全部跳过
        let engine = engine(&["", "a", "b", "c"]);
        assert_eq!(engine.decode(&[0, -1, 5, 999]), "");
        assert_eq!(engine.decode(&[0, 3, -1, 999, 1]), "ca");
    }

    #[test]
    fn test_decode_collapse_survives_invalid_gaps() {
        // 无效槽位不会重置"上一个已输出字符"
        let engine = engine(&["", "a", "b"]);
        assert_eq!(engine.decode(&[1, 0, 1]), "a");
        // 中间隔了其他字符则允许再次输出
        assert_eq!(engine.decode(&[1, 2, 1]), "aba");
    }

    #[test]
    fn test_decode_multibyte_charset() {
        let engine = engine(&["", "验", "证", "码"]);
        assert_eq!(engine.decode(&[1, 1, 2, 3, 3]), "验证码");
    }

    #[test]
    fn test_decode_boundary_index() {
        // 恰好等于字符集长度的索引无效
        let engine = engine(&["", "a", "b", "c"]);
        assert_eq!(engine.decode(&[4]), "");
        assert_eq!(engine.decode(&[3]), "c");
    }

    #[test]
    fn test_target_size_preserves_aspect_ratio() {
        assert_eq!(target_size(120, 40), (192, 64));
        assert_eq!(target_size(100, 64), (100, 64));
        // floor 语义
        assert_eq!(target_size(101, 64), (101, 64));
        assert_eq!(target_size(33, 50), (42, 64)); // floor(33 * 1.28) = 42
        // 极端窄图也至少 1 像素宽
        assert_eq!(target_size(1, 1000), (1, 64));
    }
}
