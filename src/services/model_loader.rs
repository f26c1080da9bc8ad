//! 模型加载 - 业务能力层
//!
//! 对外契约只有一个：按需给出一份经过校验的模型字节与字符集。
//! 内部实现：镜像列表按顺序下载（任一成功即停），本地磁盘缓存
//! 带版本与时间戳清单，过期或版本不符时重新下载。

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, RecognitionError};

const MANIFEST_FILE: &str = "manifest.json";
const MODEL_FILE: &str = "model.onnx";
const CHARSETS_FILE: &str = "charsets.json";

/// 模型字节 + 字符集
pub struct ModelBundle {
    pub model: Vec<u8>,
    pub charsets: Vec<String>,
}

/// 缓存清单
#[derive(Debug, Serialize, Deserialize)]
struct CacheManifest {
    version: String,
    /// Unix 秒
    timestamp: i64,
}

/// 模型加载器
pub struct ModelLoader {
    mirrors: Vec<String>,
    repo: String,
    branch: String,
    model_path: String,
    charsets_path: String,
    version: String,
    cache_dir: PathBuf,
    cache_duration_days: i64,
    auto_download: bool,
    http: reqwest::Client,
}

impl ModelLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            mirrors: config.model_mirrors.clone(),
            repo: config.model_repo.clone(),
            branch: config.model_branch.clone(),
            model_path: config.model_path.clone(),
            charsets_path: config.charsets_path.clone(),
            version: config.model_version.clone(),
            cache_dir: PathBuf::from(&config.model_cache_dir),
            cache_duration_days: config.cache_duration_days,
            auto_download: config.auto_download,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// 获取模型与字符集：先查缓存，未命中则走镜像下载并回写缓存
    pub async fn load(&self) -> Result<ModelBundle> {
        info!("🔍 检查模型缓存");
        if let Some(bundle) = self.read_cache().await {
            info!(
                "✅ 使用缓存的模型 ({:.2} MB, {} 字符)",
                bundle.model.len() as f64 / 1024.0 / 1024.0,
                bundle.charsets.len()
            );
            return Ok(bundle);
        }

        if !self.auto_download {
            anyhow::bail!("自动下载已禁用且本地缓存不可用，请先准备模型缓存");
        }

        let bundle = self.download().await?;
        if let Err(e) = self.write_cache(&bundle).await {
            warn!("⚠️ 模型缓存写入失败: {}", e);
        } else {
            info!("💾 模型已缓存到 {}", self.cache_dir.display());
        }
        Ok(bundle)
    }

    /// 清除本地缓存
    pub async fn clear_cache(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.cache_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&self.cache_dir).await?;
            info!("🗑️ 模型缓存已清除");
        }
        Ok(())
    }

    async fn read_cache(&self) -> Option<ModelBundle> {
        let manifest_bytes = tokio::fs::read(self.cache_dir.join(MANIFEST_FILE)).await.ok()?;
        let manifest: CacheManifest = serde_json::from_slice(&manifest_bytes).ok()?;

        if !manifest_valid(
            &manifest,
            &self.version,
            chrono::Utc::now().timestamp(),
            self.cache_duration_days,
        ) {
            info!("🗑️ 模型缓存已过期或版本不符");
            let _ = self.clear_cache().await;
            return None;
        }

        let model = tokio::fs::read(self.cache_dir.join(MODEL_FILE)).await.ok()?;
        let charsets_bytes = tokio::fs::read(self.cache_dir.join(CHARSETS_FILE)).await.ok()?;
        let charsets: Vec<String> = serde_json::from_slice(&charsets_bytes).ok()?;
        if model.is_empty() || charsets.is_empty() {
            return None;
        }
        Some(ModelBundle { model, charsets })
    }

    async fn write_cache(&self, bundle: &ModelBundle) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let manifest = CacheManifest {
            version: self.version.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        tokio::fs::write(
            self.cache_dir.join(MANIFEST_FILE),
            serde_json::to_vec(&manifest)?,
        )
        .await?;
        tokio::fs::write(self.cache_dir.join(MODEL_FILE), &bundle.model).await?;
        tokio::fs::write(
            self.cache_dir.join(CHARSETS_FILE),
            serde_json::to_vec(&bundle.charsets)?,
        )
        .await?;
        Ok(())
    }

    async fn download(&self) -> Result<ModelBundle> {
        info!("📥 开始下载模型");
        for (i, mirror) in self.mirrors.iter().enumerate() {
            info!("🌐 镜像 [{}/{}]: {}", i + 1, self.mirrors.len(), mirror);
            match self.download_from(mirror).await {
                Ok(bundle) => {
                    info!(
                        "✅ 下载成功 ({:.2} MB, {} 字符)",
                        bundle.model.len() as f64 / 1024.0 / 1024.0,
                        bundle.charsets.len()
                    );
                    return Ok(bundle);
                }
                Err(e) => {
                    warn!("❌ 镜像 {} 失败: {}", i + 1, e);
                }
            }
        }
        Err(AppError::Recognition(RecognitionError::ModelDownloadFailed {
            mirrors: self.mirrors.len(),
        })
        .into())
    }

    async fn download_from(&self, mirror: &str) -> Result<ModelBundle> {
        let model_url = build_url(mirror, &self.repo, &self.branch, &self.model_path);
        let charsets_url = build_url(mirror, &self.repo, &self.branch, &self.charsets_path);

        let (model, charsets) = tokio::try_join!(
            self.fetch_bytes(&model_url),
            self.fetch_charsets(&charsets_url)
        )?;

        if model.is_empty() {
            anyhow::bail!("模型文件为空: {}", model_url);
        }
        if charsets.is_empty() {
            anyhow::bail!("字符集为空: {}", charsets_url);
        }
        Ok(ModelBundle { model, charsets })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .header("Cache-Control", "max-age=2592000")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("下载 {} 失败", url))?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn fetch_charsets(&self, url: &str) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(url)
            .header("Cache-Control", "max-age=2592000")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("下载 {} 失败", url))?;
        Ok(resp.json().await?)
    }
}

/// 拼接镜像 URL：jsdelivr 形式是 repo@branch，raw 形式是 repo/branch
fn build_url(mirror: &str, repo: &str, branch: &str, path: &str) -> String {
    if mirror.contains("jsdelivr") {
        format!("{}/{}@{}/{}", mirror, repo, branch, path)
    } else {
        format!("{}/{}/{}/{}", mirror, repo, branch, path)
    }
}

/// 缓存有效性：版本一致且未超过有效期
fn manifest_valid(manifest: &CacheManifest, version: &str, now: i64, duration_days: i64) -> bool {
    manifest.version == version && now - manifest.timestamp <= duration_days * 24 * 3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_raw_mirror() {
        assert_eq!(
            build_url(
                "https://raw.githubusercontent.com",
                "owner/repo",
                "main",
                "public/common.onnx"
            ),
            "https://raw.githubusercontent.com/owner/repo/main/public/common.onnx"
        );
    }

    #[test]
    fn test_build_url_jsdelivr_mirror() {
        assert_eq!(
            build_url(
                "https://cdn.jsdelivr.net/gh",
                "owner/repo",
                "main",
                "public/charsets.json"
            ),
            "https://cdn.jsdelivr.net/gh/owner/repo@main/public/charsets.json"
        );
    }

    #[test]
    fn test_manifest_validity() {
        let manifest = CacheManifest {
            version: "1.0.2".to_string(),
            timestamp: 1_000_000,
        };
        let day = 24 * 3600;

        assert!(manifest_valid(&manifest, "1.0.2", 1_000_000 + day, 30));
        assert!(manifest_valid(&manifest, "1.0.2", 1_000_000 + 30 * day, 30));
        // 超过有效期
        assert!(!manifest_valid(&manifest, "1.0.2", 1_000_000 + 31 * day, 30));
        // 版本不符
        assert!(!manifest_valid(&manifest, "1.0.3", 1_000_000 + day, 30));
    }

    #[tokio::test]
    async fn test_cache_roundtrip() {
        let mut config = Config::default();
        config.model_cache_dir = std::env::temp_dir()
            .join(format!("captcha_autofill_test_{}", std::process::id()))
            .to_string_lossy()
            .to_string();

        let loader = ModelLoader::new(&config);
        let _ = loader.clear_cache().await;

        // 空缓存未命中
        assert!(loader.read_cache().await.is_none());

        let bundle = ModelBundle {
            model: vec![1, 2, 3, 4],
            charsets: vec!["".to_string(), "a".to_string()],
        };
        loader.write_cache(&bundle).await.unwrap();

        let cached = loader.read_cache().await.expect("缓存应当命中");
        assert_eq!(cached.model, vec![1, 2, 3, 4]);
        assert_eq!(cached.charsets, vec!["".to_string(), "a".to_string()]);

        loader.clear_cache().await.unwrap();
        assert!(loader.read_cache().await.is_none());
    }
}
