//! 变更监视器 - 编排层
//!
//! 两个状态：Idle（未观察）与 Watching（已订阅 + 轮询）。
//! start() 先做一次全页扫描，再订阅变更通知；stop() 退订并取消
//! 周期任务，但不打断已经起飞的识别任务（结果由流程层按停止
//! 标志决定是否落页）。
//!
//! 每个候选的识别工作作为独立异步任务派发，同一元素的并发识别
//! 由 in-flight 守卫拒绝：识别尚未结束时的重复触发直接丢弃。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::infrastructure::mutation_source::MutationSource;
use crate::infrastructure::page_agent::PageAgent;
use crate::models::element::{ElementDescriptor, ElementKind};
use crate::models::mutation::MutationTrigger;
use crate::services::classifier::ElementClassifier;
use crate::workflow::candidate_ctx::CandidateCtx;
use crate::workflow::recognize_flow::RecognizeFlow;

/// 复查流程里图片加载的等待上限（毫秒）
const RECHECK_IMAGE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    Idle,
    Watching,
}

/// 派发识别任务时共享的内核
struct WatcherCore {
    agent: PageAgent,
    flow: Arc<RecognizeFlow>,
    classifier: ElementClassifier,
    /// 正在识别中的元素 token
    in_flight: Mutex<HashSet<String>>,
    /// 停止标志，流程层用它决定迟到结果是否落页
    halted: Arc<AtomicBool>,
}

impl WatcherCore {
    /// 为一个候选派发独立的识别任务
    ///
    /// 同一元素已有识别在途时直接丢弃本次触发
    fn dispatch(
        core: &Arc<WatcherCore>,
        descriptor: ElementDescriptor,
        trigger: &'static str,
        recheck: bool,
    ) {
        {
            let mut in_flight = core.in_flight.lock().unwrap();
            if !in_flight.insert(descriptor.token.clone()) {
                debug!("⏭️ 元素 {} 识别尚未结束，忽略本次触发", descriptor.token);
                return;
            }
        }

        let core = Arc::clone(core);
        tokio::spawn(async move {
            let token = descriptor.token.clone();
            if let Err(e) = core.process(descriptor, trigger, recheck).await {
                error!("[候选 {}] ❌ 处理过程中发生错误: {}", token, e);
            }
            core.in_flight.lock().unwrap().remove(&token);
        });
    }

    async fn process(
        &self,
        descriptor: ElementDescriptor,
        trigger: &'static str,
        recheck: bool,
    ) -> Result<()> {
        let descriptor = if recheck {
            debug!(
                "🔄 检测到内容刷新: {} ({})",
                descriptor.token, descriptor.kind
            );
            match descriptor.kind {
                ElementKind::Image => {
                    // 等新内容加载完成再重新分类，否则尺寸还是 0
                    if !self
                        .agent
                        .wait_image(&descriptor.token, RECHECK_IMAGE_TIMEOUT_MS)
                        .await?
                    {
                        warn!("[候选 {}] ⚠️ 图片未能成功加载，跳过识别", descriptor.token);
                        return Ok(());
                    }
                }
                _ => {
                    self.agent.next_frame().await?;
                }
            }
            match self.agent.describe(&descriptor.token).await? {
                Some(fresh) => fresh,
                None => return Ok(()),
            }
        } else {
            descriptor
        };

        let ctx = CandidateCtx::new(&descriptor.token, descriptor.kind, trigger);
        self.flow.run(&self.agent, &descriptor, &ctx).await?;
        Ok(())
    }
}

/// 变更监视器
pub struct MutationWatcher {
    core: Arc<WatcherCore>,
    source: Arc<dyn MutationSource>,
    poll_interval: Duration,
    state: Mutex<WatcherState>,
    /// 批次循环与周期轮询任务
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MutationWatcher {
    pub fn new(
        agent: PageAgent,
        flow: Arc<RecognizeFlow>,
        classifier: ElementClassifier,
        source: Arc<dyn MutationSource>,
        poll_interval: Duration,
        halted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            core: Arc::new(WatcherCore {
                agent,
                flow,
                classifier,
                in_flight: Mutex::new(HashSet::new()),
                halted,
            }),
            source,
            poll_interval,
            state: Mutex::new(WatcherState::Idle),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Idle -> Watching：全页扫描 + 订阅变更 + 周期轮询
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == WatcherState::Watching {
                return Ok(());
            }
            *state = WatcherState::Watching;
        }
        self.core.halted.store(false, Ordering::Relaxed);
        info!("🤖 启动验证码自动检测");

        // 初始全页扫描
        let existing = self.core.agent.collect_all().await?;
        info!("🔍 检测页面已存在的元素: {} 个", existing.len());
        for descriptor in existing {
            WatcherCore::dispatch(&self.core, descriptor, "sweep", false);
        }

        // 订阅变更批次
        let mut rx = self.source.subscribe().await?;
        let core = Arc::clone(&self.core);
        let batch_loop = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                core.flow.tracker().prune(&batch.alive);
                for record in batch.records {
                    WatcherCore::dispatch(
                        &core,
                        record.descriptor,
                        trigger_name(record.trigger),
                        record.trigger.is_recheck(),
                    );
                }
            }
        });

        // canvas 重绘不一定改变任何可观察属性，周期性复查兜底
        let core = Arc::clone(&self.core);
        let poll_interval = self.poll_interval;
        let poll_loop = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.tick().await; // 跳过立即触发的第一跳
            loop {
                ticker.tick().await;
                match core.agent.canvases().await {
                    Ok(descriptors) => {
                        for descriptor in descriptors {
                            if core.classifier.accepts(&descriptor) {
                                WatcherCore::dispatch(&core, descriptor, "poll", true);
                            }
                        }
                    }
                    Err(e) => debug!("轮询 canvas 失败: {}", e),
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(batch_loop);
        tasks.push(poll_loop);
        Ok(())
    }

    /// Watching -> Idle：退订并取消周期任务，在途识别不取消
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == WatcherState::Idle {
                return;
            }
            *state = WatcherState::Idle;
        }
        self.core.halted.store(true, Ordering::Relaxed);
        info!("🛑 停止验证码自动检测");

        self.source.unsubscribe().await;
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

fn trigger_name(trigger: MutationTrigger) -> &'static str {
    match trigger {
        MutationTrigger::NodeAdded => "mutation",
        MutationTrigger::ImageSrcChanged => "img-src",
        MutationTrigger::CanvasAttrChanged => "canvas-attr",
        MutationTrigger::BackgroundStyleChanged => "style-bg",
        MutationTrigger::SvgContentChanged => "svg-childlist",
    }
}
