//! OCR 推理运行时 - 业务能力层
//!
//! 推理本身是外部能力：这里只定义契约（就绪探测 + 单次推理），
//! 并提供一个基于 HTTP 的实现，对接本机的 ddddocr 推理边车。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::models::imaging::Tensor;

/// 就绪探测总预算：100ms x 100 次 = 10 秒
const READY_POLL_INTERVAL_MS: u64 = 100;
const READY_POLL_ATTEMPTS: u32 = 100;

/// OCR 推理运行时能力
#[async_trait]
pub trait OcrRuntime: Send + Sync {
    /// 等待运行时就绪（轮询，超时报错）
    async fn ensure_ready(&self) -> Result<()>;

    /// 加载模型字节
    async fn load_model(&self, model: &[u8]) -> Result<()>;

    /// 执行一次推理，返回输出索引序列
    async fn infer(&self, tensor: &Tensor) -> Result<Vec<i64>>;
}

/// 运行时客户端错误
#[derive(Debug, Error)]
pub enum OcrRuntimeError {
    #[error("推理运行时未就绪 (已等待 {waited_ms} ms): {endpoint}")]
    NotReady { endpoint: String, waited_ms: u64 },
    #[error("推理请求失败: {0}")]
    Request(#[from] reqwest::Error),
    #[error("推理运行时响应异常: {0}")]
    BadResponse(String),
}

#[derive(Serialize)]
struct InferRequest<'a> {
    dims: [usize; 4],
    data: &'a [f32],
}

#[derive(Deserialize)]
struct InferResponse {
    indices: Vec<i64>,
}

/// 基于 HTTP 的推理运行时客户端
///
/// 约定三个端点：GET /health、POST /session（模型字节）、POST /run
pub struct HttpOcrRuntime {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOcrRuntime {
    pub fn new(endpoint: &str) -> Self {
        Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn health_ok(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_millis(READY_POLL_INTERVAL_MS * 5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl OcrRuntime for HttpOcrRuntime {
    async fn ensure_ready(&self) -> Result<()> {
        for attempt in 0..READY_POLL_ATTEMPTS {
            if self.health_ok().await {
                if attempt > 0 {
                    info!("✅ 推理运行时已就绪 (第 {} 次探测)", attempt + 1);
                }
                return Ok(());
            }
            sleep(Duration::from_millis(READY_POLL_INTERVAL_MS)).await;
        }
        warn!("⚠️ 推理运行时始终未就绪: {}", self.base_url);
        Err(OcrRuntimeError::NotReady {
            endpoint: self.base_url.clone(),
            waited_ms: READY_POLL_INTERVAL_MS * READY_POLL_ATTEMPTS as u64,
        }
        .into())
    }

    async fn load_model(&self, model: &[u8]) -> Result<()> {
        info!("🚀 上传模型到推理运行时 ({:.2} MB)", model.len() as f64 / 1024.0 / 1024.0);
        let resp = self
            .client
            .post(format!("{}/session", self.base_url))
            .header("Content-Type", "application/octet-stream")
            .body(model.to_vec())
            .send()
            .await
            .map_err(OcrRuntimeError::Request)?;
        if !resp.status().is_success() {
            return Err(OcrRuntimeError::BadResponse(format!(
                "加载模型返回 HTTP {}",
                resp.status()
            ))
            .into());
        }
        Ok(())
    }

    async fn infer(&self, tensor: &Tensor) -> Result<Vec<i64>> {
        debug!(
            "推理输入: {}x{}x{}x{}",
            tensor.dims[0], tensor.dims[1], tensor.dims[2], tensor.dims[3]
        );
        let resp = self
            .client
            .post(format!("{}/run", self.base_url))
            .json(&InferRequest {
                dims: tensor.dims,
                data: &tensor.data,
            })
            .send()
            .await
            .map_err(OcrRuntimeError::Request)?;
        if !resp.status().is_success() {
            return Err(OcrRuntimeError::BadResponse(format!(
                "推理返回 HTTP {}",
                resp.status()
            ))
            .into());
        }
        let body: InferResponse = resp
            .json()
            .await
            .map_err(|e| OcrRuntimeError::BadResponse(e.to_string()))?;
        Ok(body.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let runtime = HttpOcrRuntime::new("http://127.0.0.1:18700/");
        assert_eq!(runtime.base_url, "http://127.0.0.1:18700");
    }

    #[test]
    fn test_infer_response_deserialize() {
        let body = r#"{"indices": [0, 3, 3, 0, 12]}"#;
        let resp: InferResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.indices, vec![0, 3, 3, 0, 12]);
    }
}
