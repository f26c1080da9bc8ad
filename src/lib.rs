//! # Captcha Autofill
//!
//! 一个自动检测并识别页面验证码、把结果填回输入框的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `PageAgent` - 页面侧原语（token / 快照 / 指纹 / 输入框查找）
//! - `MutationSource` - 变更批次订阅接口及其 CDP 实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个候选元素
//! - `ElementClassifier` - 候选判定能力（选择器 / 启发式）
//! - `ChangeTracker` - 指纹比对能力
//! - `ImagePipeline` - 像素提取与预处理能力
//! - `RecognitionEngine` - 推理 + 解码能力
//! - `InputBinder` - 输入框解析与填充能力
//! - `ModelLoader` - 模型获取能力（镜像回退 + 本地缓存）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个候选元素"的完整处理流程
//! - `CandidateCtx` - 上下文封装（token + 类型 + 触发来源）
//! - `RecognizeFlow` - 流程编排（classify → track → extract → recognize → fill）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/watcher` - 变更监视器，管理订阅、轮询和并发守卫
//!
//! ## 模块结构

pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use browser::{connect_to_browser_and_page, launch_headless_browser};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{JsExecutor, PageAgent};
pub use models::{ElementDescriptor, ElementKind, EventBus, PipelineEvent};
pub use orchestrator::MutationWatcher;
pub use workflow::{CandidateCtx, FlowResult, RecognizeFlow};
