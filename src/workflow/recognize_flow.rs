//! 单个候选元素的识别流程 - 流程层
//!
//! 核心职责：定义"一个候选元素"的完整处理流程
//!
//! 流程顺序：
//! 1. 分类 → 指纹比对（未变化直接跳过）
//! 2. 清空旧输入 → 等待渲染完成
//! 3. 提取像素 → 识别 → 标记已处理
//! 4. 解析输入框 → 填充
//!
//! 各阶段发出生命周期事件；加载/渲染失败静默放弃本次尝试，
//! 推理失败发 RecognizeError 且不标记已处理，下次变化自然重试。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::infrastructure::page_agent::PageAgent;
use crate::models::element::{ElementDescriptor, ElementKind};
use crate::models::events::{EventBus, PipelineEvent};
use crate::models::imaging::{GrayBuffer, RecognitionResult};
use crate::services::change_tracker::ChangeTracker;
use crate::services::classifier::ElementClassifier;
use crate::services::image_pipeline::{extract_css_url, ImagePipeline};
use crate::services::input_binder::InputBinder;
use crate::services::recognition::RecognitionEngine;
use crate::workflow::candidate_ctx::CandidateCtx;

/// 图片加载等待上限（毫秒）
const IMAGE_LOAD_TIMEOUT_MS: u64 = 5000;
/// SVG 栅格化等待上限（毫秒）
const SVG_RASTERIZE_TIMEOUT_MS: u64 = 5000;

/// 候选元素处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowResult {
    /// 完成了一次识别
    Recognized,
    /// 跳过（未通过分类 / 内容未变化 / 渲染失败等）
    Skipped,
}

/// 识别流程
///
/// - 编排单个候选元素的完整处理
/// - 不持有任何页面资源（只借用 PageAgent）
/// - 只依赖业务能力（services）
pub struct RecognizeFlow {
    classifier: ElementClassifier,
    tracker: Arc<ChangeTracker>,
    pipeline: ImagePipeline,
    engine: RecognitionEngine,
    binder: InputBinder,
    events: EventBus,
    /// 监视器停止后置位；迟到的识别结果只发事件不再改页面
    halted: Arc<AtomicBool>,
}

impl RecognizeFlow {
    pub fn new(
        classifier: ElementClassifier,
        tracker: Arc<ChangeTracker>,
        pipeline: ImagePipeline,
        engine: RecognitionEngine,
        binder: InputBinder,
        events: EventBus,
        halted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            classifier,
            tracker,
            pipeline,
            engine,
            binder,
            events,
            halted,
        }
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    pub async fn run(
        &self,
        agent: &PageAgent,
        descriptor: &ElementDescriptor,
        ctx: &CandidateCtx,
    ) -> Result<FlowResult> {
        if !self.classifier.accepts(descriptor) {
            return Ok(FlowResult::Skipped);
        }

        // 指纹比对：元素已消失或内容未变化都直接跳过
        let Some(fingerprint) = agent.fingerprint(&descriptor.token).await? else {
            return Ok(FlowResult::Skipped);
        };
        if !self.tracker.has_changed(&descriptor.token, &fingerprint) {
            return Ok(FlowResult::Skipped);
        }

        info!("{} 🎯 检测到验证码候选", ctx);
        self.events.emit(PipelineEvent::DetectFound {
            token: descriptor.token.clone(),
            kind: descriptor.kind,
        });

        // 先清掉旧的猜测，避免识别期间旧值被提交
        self.binder.clear_previous(agent, &descriptor.token).await?;

        // 等待渲染完成
        match descriptor.kind {
            ElementKind::Image => {
                if !agent
                    .wait_image(&descriptor.token, IMAGE_LOAD_TIMEOUT_MS)
                    .await?
                {
                    warn!("{} ⚠️ 图片未能成功加载，跳过识别", ctx);
                    return Ok(FlowResult::Skipped);
                }
                // 加载完成后再确认一次尺寸
                match agent.describe(&descriptor.token).await? {
                    Some(fresh) if fresh.width > 0 && fresh.height > 0 => {
                        info!("{} 📐 尺寸: {}x{}", ctx, fresh.width, fresh.height);
                    }
                    _ => {
                        warn!("{} ⚠️ 图片加载后尺寸异常，跳过识别", ctx);
                        return Ok(FlowResult::Skipped);
                    }
                }
            }
            // canvas / svg / 背景图等待一帧让绘制收尾
            _ => {
                agent.next_frame().await?;
            }
        }

        info!("{} 🔍 识别中", ctx);
        self.events.emit(PipelineEvent::RecognizeStart {
            token: descriptor.token.clone(),
        });

        match self.recognize_once(agent, descriptor).await {
            Ok(result) => {
                info!("{} ✅ 结果: {}", ctx, result.text);

                // 按派发识别时的内容重算指纹再登记
                if let Some(fp) = agent.fingerprint(&descriptor.token).await? {
                    self.tracker.mark_processed(&descriptor.token, fp);
                }
                self.events.emit(PipelineEvent::RecognizeComplete {
                    token: descriptor.token.clone(),
                    text: result.text.clone(),
                });

                if self.halted.load(Ordering::Relaxed) {
                    info!("{} ⏸️ 检测已停止，丢弃识别结果", ctx);
                    return Ok(FlowResult::Recognized);
                }

                self.binder.fill(agent, &descriptor.token, &result.text).await?;
                Ok(FlowResult::Recognized)
            }
            Err(e) => {
                error!("{} ❌ 识别失败: {}", ctx, e);
                self.events.emit(PipelineEvent::RecognizeError {
                    token: descriptor.token.clone(),
                    message: e.to_string(),
                });
                Ok(FlowResult::Skipped)
            }
        }
    }

    /// 提取像素并识别一次
    async fn recognize_once(
        &self,
        agent: &PageAgent,
        descriptor: &ElementDescriptor,
    ) -> Result<RecognitionResult> {
        let gray = self.extract(agent, descriptor).await?;
        self.engine.recognize(&gray).await
    }

    /// 按元素类型提取灰度像素
    async fn extract(
        &self,
        agent: &PageAgent,
        descriptor: &ElementDescriptor,
    ) -> Result<GrayBuffer> {
        match descriptor.kind {
            ElementKind::Image => {
                // 优先直接从 DOM 元素取像素，不触发重新加载
                if let Some(data_url) = agent.snapshot(&descriptor.token).await? {
                    return ImagePipeline::from_data_url(&data_url);
                }
                // 跨域污染时退回按 URL 下载
                if let Some(src) = descriptor.src.as_deref().filter(|s| !s.is_empty()) {
                    warn!("⚠️ 元素快照不可用，改为按 URL 获取: {}", src);
                    return self.pipeline.fetch_gray(agent, src).await;
                }
                Err(AppError::snapshot_unavailable(&descriptor.token).into())
            }
            ElementKind::Canvas => {
                let data_url = agent
                    .snapshot(&descriptor.token)
                    .await?
                    .ok_or_else(|| AppError::snapshot_unavailable(&descriptor.token))?;
                ImagePipeline::from_data_url(&data_url)
            }
            ElementKind::Svg => {
                let data_url = agent
                    .rasterize_svg(&descriptor.token, SVG_RASTERIZE_TIMEOUT_MS)
                    .await?
                    .ok_or_else(|| AppError::snapshot_unavailable(&descriptor.token))?;
                ImagePipeline::from_data_url(&data_url)
            }
            ElementKind::BackgroundDiv => {
                let bg = descriptor.bg.as_deref().unwrap_or("");
                let url = extract_css_url(bg)
                    .ok_or_else(|| AppError::background_url_missing(bg))?;
                self.pipeline.fetch_gray(agent, &url).await
            }
        }
    }
}
