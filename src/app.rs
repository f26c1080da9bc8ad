use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chromiumoxide::Browser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::{CdpMutationSource, JsExecutor, PageAgent};
use crate::models::events::{EventBus, PipelineEvent};
use crate::orchestrator::MutationWatcher;
use crate::services::{
    ChangeTracker, ElementClassifier, HttpOcrRuntime, ImagePipeline, InputBinder, ModelLoader,
    OcrRuntime, RecognitionEngine,
};
use crate::utils::logging;
use crate::workflow::RecognizeFlow;

/// 应用主结构
pub struct App {
    config: Config,
    /// 持有浏览器连接，存活期间保持事件处理
    #[allow(dead_code)]
    browser: Browser,
    agent: PageAgent,
}

impl App {
    /// 初始化应用：连接浏览器、定位页面、注入页面代理
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        let (browser, page) = if config.launch_headless {
            browser::launch_headless_browser(
                Some(config.target_url.as_str()).filter(|u| !u.is_empty()),
                Some(config.chrome_executable.as_str()).filter(|p| !p.is_empty()),
            )
            .await?
        } else {
            browser::connect_to_browser_and_page(
                config.browser_debug_port,
                Some(config.target_url.as_str()).filter(|u| !u.is_empty()),
                Some(config.target_title.as_str()).filter(|t| !t.is_empty()),
            )
            .await?
        };

        let executor = JsExecutor::new(page);
        let agent = PageAgent::new(executor);
        let selector = config.captcha_selector.trim();
        agent
            .install(if selector.is_empty() { None } else { Some(selector) })
            .await?;

        Ok(Self {
            config,
            browser,
            agent,
        })
    }

    /// 运行应用主逻辑：白名单检查、模型准备、启动监视器直到 Ctrl+C
    pub async fn run(&self) -> Result<()> {
        let hostname = self.agent.hostname().await.unwrap_or_default();
        if !self.config.should_run(&hostname) {
            warn!("🚫 当前站点 {} 不在白名单中，程序结束", hostname);
            return Ok(());
        }
        info!("📍 当前站点: {}", hostname);
        if self.config.verbose_logging {
            info!("🔧 生效配置: {:?}", self.config);
        }

        if !self.config.auto_detect {
            warn!("⏸️ 自动检测未启用 (CAPTCHA_AUTO_DETECT=false)，程序结束");
            return Ok(());
        }

        // 准备模型与推理运行时
        let loader = ModelLoader::new(&self.config);
        let bundle = loader.load().await?;

        info!("⏳ 等待推理运行时: {}", self.config.ocr_endpoint);
        let runtime: Arc<dyn OcrRuntime> = Arc::new(HttpOcrRuntime::new(&self.config.ocr_endpoint));
        runtime.ensure_ready().await?;
        runtime.load_model(&bundle.model).await?;
        info!("✅ OCR 已就绪 ({} 字符)", bundle.charsets.len());

        // 组装流水线
        let events = EventBus::default();
        spawn_event_logger(&events);

        let classifier = ElementClassifier::new(&self.config);
        let tracker = Arc::new(ChangeTracker::new());
        let halted = Arc::new(AtomicBool::new(false));
        let engine = RecognitionEngine::new(runtime, bundle.charsets)?;
        let flow = Arc::new(RecognizeFlow::new(
            classifier.clone(),
            Arc::clone(&tracker),
            ImagePipeline::new(),
            engine,
            InputBinder::new(&self.config),
            events.clone(),
            Arc::clone(&halted),
        ));

        let source = Arc::new(CdpMutationSource::new(
            self.agent.clone(),
            Duration::from_millis(self.config.drain_interval_ms),
        ));
        let watcher = MutationWatcher::new(
            self.agent.clone(),
            flow,
            classifier,
            source,
            Duration::from_millis(self.config.poll_interval_ms),
            halted,
        );

        watcher.start().await?;
        info!("🤖 自动检测已启动，按 Ctrl+C 退出");

        tokio::signal::ctrl_c().await?;
        watcher.stop().await;
        info!("👋 已退出");

        Ok(())
    }
}

/// 订阅生命周期事件并打日志（外部 UI / 通知层的占位消费者）
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PipelineEvent::DetectFound { token, kind }) => {
                    info!("📢 detect:found {} ({})", token, kind);
                }
                Ok(PipelineEvent::RecognizeStart { token }) => {
                    info!("📢 recognize:start {}", token);
                }
                Ok(PipelineEvent::RecognizeComplete { token, text }) => {
                    info!(
                        "📢 recognize:complete {} -> {}",
                        token,
                        logging::truncate_text(&text, 32)
                    );
                }
                Ok(PipelineEvent::RecognizeError { token, message }) => {
                    error!("📢 recognize:error {} -> {}", token, message);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("事件消费落后，丢弃了 {} 条", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
