//! 候选元素处理上下文
//!
//! 封装"我正在处理哪个元素、因何触发"这一信息

use std::fmt::Display;

use crate::models::element::ElementKind;

/// 候选元素上下文
#[derive(Debug, Clone)]
pub struct CandidateCtx {
    /// 元素 token
    pub token: String,

    /// 元素类型
    pub kind: ElementKind,

    /// 触发来源（仅用于日志显示）
    pub trigger: &'static str,
}

impl CandidateCtx {
    /// 创建新的候选上下文
    pub fn new(token: impl Into<String>, kind: ElementKind, trigger: &'static str) -> Self {
        Self {
            token: token.into(),
            kind,
            trigger,
        }
    }
}

impl Display for CandidateCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[候选 {} 类型#{} 来源#{}]", self.token, self.kind, self.trigger)
    }
}
