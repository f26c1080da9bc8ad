//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 监视页面变更并驱动整条识别流水线，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::MutationWatcher (订阅变更批次 / 周期轮询 / 并发守卫)
//!     ↓
//! workflow::RecognizeFlow (处理单个候选元素)
//!     ↓
//! services (能力层：classify / track / extract / recognize / fill)
//!     ↓
//! infrastructure (基础设施：JsExecutor / PageAgent / MutationSource)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：监视器只做调度与并发控制，不做业务判断
//! 2. **资源隔离**：只有编排层持有变更订阅与周期任务
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod watcher;

pub use watcher::MutationWatcher;
