//! 图像管线 - 业务能力层
//!
//! 把视觉来源（元素快照 data URL、图片 URL、原始字节）转成
//! 归一化前的灰度缓冲。透明像素一律向白色混合：验证码底色
//! 习惯上是浅色，向黑色混合会让前景字符被吃掉。

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::infrastructure::page_agent::PageAgent;
use crate::models::imaging::GrayBuffer;

/// 图像管线
pub struct ImagePipeline {
    http: reqwest::Client,
}

impl ImagePipeline {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// 解码图像字节，向白色混合透明度后转灰度
    pub fn decode_gray(bytes: &[u8]) -> Result<GrayBuffer> {
        let rgba = image::load_from_memory(bytes)
            .context("图像解码失败")?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(AppError::Image(crate::error::ImageError::EmptyImage { width, height }).into());
        }

        let mut data = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            data.push(gray_over_white(r, g, b, a));
        }
        Ok(GrayBuffer::new(data, width, height))
    }

    /// 解码 `data:image/...;base64,...` 形式的 data URL
    pub fn from_data_url(url: &str) -> Result<GrayBuffer> {
        let payload = url
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| anyhow::anyhow!("data URL 格式异常"))?;
        let bytes = BASE64.decode(payload).context("data URL base64 解码失败")?;
        Self::decode_gray(&bytes)
    }

    /// 下载并解码图片 URL
    ///
    /// 优先走页面内 fetch（带页面凭据，绕过跨域限制），
    /// 失败时退回直接下载。
    pub async fn fetch_gray(&self, agent: &PageAgent, url: &str) -> Result<GrayBuffer> {
        if url.starts_with("data:") {
            return Self::from_data_url(url);
        }

        match agent.fetch_data_url(url).await {
            Ok(Some(data_url)) => return Self::from_data_url(&data_url),
            Ok(None) => warn!("⚠️ 页面内获取图片失败，改为直接下载: {}", url),
            Err(e) => warn!("⚠️ 页面内获取图片出错 ({})，改为直接下载: {}", e, url),
        }

        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::image_fetch_failed(url, e))?
            .bytes()
            .await
            .map_err(|e| AppError::image_fetch_failed(url, e))?;
        debug!("直接下载完成: {} ({} 字节)", url, bytes.len());
        Self::decode_gray(&bytes)
    }

    /// 双线性插值缩放，边缘像素取钳位而不是环绕
    pub fn resize(src: &GrayBuffer, new_width: u32, new_height: u32) -> GrayBuffer {
        let mut data = vec![0u8; (new_width * new_height) as usize];
        let x_ratio = src.width as f32 / new_width as f32;
        let y_ratio = src.height as f32 / new_height as f32;

        for y in 0..new_height {
            for x in 0..new_width {
                let px = x as f32 * x_ratio;
                let py = y as f32 * y_ratio;

                let x1 = px.floor() as u32;
                let x2 = (x1 + 1).min(src.width - 1);
                let y1 = py.floor() as u32;
                let y2 = (y1 + 1).min(src.height - 1);

                let fx = px - x1 as f32;
                let fy = py - y1 as f32;

                let v1 = src.at(x1, y1) as f32;
                let v2 = src.at(x2, y1) as f32;
                let v3 = src.at(x1, y2) as f32;
                let v4 = src.at(x2, y2) as f32;

                let value = v1 * (1.0 - fx) * (1.0 - fy)
                    + v2 * fx * (1.0 - fy)
                    + v3 * (1.0 - fx) * fy
                    + v4 * fx * fy;

                data[(y * new_width + x) as usize] = value.round() as u8;
            }
        }

        GrayBuffer::new(data, new_width, new_height)
    }

    /// 归一化到 [0, 1]
    pub fn normalize(src: &GrayBuffer) -> Vec<f32> {
        src.data.iter().map(|&v| v as f32 / 255.0).collect()
    }
}

impl Default for ImagePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// 向白色混合透明度，再按 ITU-R BT.709 亮度权重转灰度
#[inline]
fn gray_over_white(r: u8, g: u8, b: u8, a: u8) -> u8 {
    let alpha = a as f32 / 255.0;
    let rr = r as f32 * alpha + 255.0 * (1.0 - alpha);
    let gg = g as f32 * alpha + 255.0 * (1.0 - alpha);
    let bb = b as f32 * alpha + 255.0 * (1.0 - alpha);
    (0.2126 * rr + 0.7152 * gg + 0.0722 * bb).round() as u8
}

/// 从 CSS background-image 值中提取第一个 URL
pub fn extract_css_url(value: &str) -> Option<String> {
    let re = Regex::new(r#"url\(['"]?(.+?)['"]?\)"#).ok()?;
    re.captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn buffer(data: Vec<u8>, width: u32, height: u32) -> GrayBuffer {
        GrayBuffer::new(data, width, height)
    }

    #[test]
    fn test_resize_identity() {
        // 宽高不变时，双线性缩放应当是恒等变换
        let src = buffer(vec![10, 20, 30, 40, 50, 60, 70, 80, 90], 3, 3);
        let out = ImagePipeline::resize(&src, 3, 3);
        assert_eq!(out.data, src.data);
    }

    #[test]
    fn test_resize_downscale_averages() {
        // 4x1 缩到 2x1：目标像素映射回 0.0 和 2.0，取对应源像素
        let src = buffer(vec![0, 100, 200, 100], 4, 1);
        let out = ImagePipeline::resize(&src, 2, 1);
        assert_eq!(out.width, 2);
        assert_eq!(out.data, vec![0, 200]);
    }

    #[test]
    fn test_resize_upscale_interpolates() {
        // 2x1 放大到 3x1：中间像素是 0 和 255 的插值
        let src = buffer(vec![0, 255], 2, 1);
        let out = ImagePipeline::resize(&src, 3, 1);
        assert_eq!(out.data[0], 0);
        assert_eq!(out.data[2], 255);
        assert!(out.data[1] > 0 && out.data[1] < 255);
    }

    #[test]
    fn test_transparent_pixels_become_white() {
        // 完全透明的 2x2 源向白色混合后应当全 255
        let mut png = Vec::new();
        let rgba = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 0]));
        image::DynamicImage::ImageRgba8(rgba)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let gray = ImagePipeline::decode_gray(&png).unwrap();
        assert_eq!(gray.width, 2);
        assert_eq!(gray.height, 2);
        assert!(gray.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_luma_weights() {
        // 不混合透明度时就是标准 BT.709 权重
        assert_eq!(gray_over_white(255, 0, 0, 255), 54); // 0.2126 * 255
        assert_eq!(gray_over_white(0, 255, 0, 255), 182); // 0.7152 * 255
        assert_eq!(gray_over_white(0, 0, 255, 255), 18); // 0.0722 * 255
        assert_eq!(gray_over_white(255, 255, 255, 255), 255);
        assert_eq!(gray_over_white(0, 0, 0, 255), 0);
    }

    #[test]
    fn test_normalize_range() {
        let src = buffer(vec![0, 127, 255], 3, 1);
        let normalized = ImagePipeline::normalize(&src);
        assert_eq!(normalized[0], 0.0);
        assert!((normalized[1] - 127.0 / 255.0).abs() < 1e-6);
        assert_eq!(normalized[2], 1.0);
    }

    #[test]
    fn test_from_data_url_roundtrip() {
        use base64::engine::general_purpose::STANDARD;

        let mut png = Vec::new();
        let rgba = image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 255, 255, 255]));
        image::DynamicImage::ImageRgba8(rgba)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&png));

        let gray = ImagePipeline::from_data_url(&url).unwrap();
        assert_eq!((gray.width, gray.height), (3, 2));
        assert!(gray.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_extract_css_url() {
        assert_eq!(
            extract_css_url("url(\"https://x/captcha.png\")").as_deref(),
            Some("https://x/captcha.png")
        );
        assert_eq!(
            extract_css_url("url('/captcha?r=1')").as_deref(),
            Some("/captcha?r=1")
        );
        assert_eq!(
            extract_css_url("url(data:image/png;base64,AAAA)").as_deref(),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(extract_css_url("none"), None);
    }
}
