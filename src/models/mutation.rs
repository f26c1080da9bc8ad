//! 页面变更通知模型
//!
//! 页面内脚本把 MutationObserver 的记录整理成可序列化的批次，
//! 由订阅方按固定间隔拉取。

use serde::Deserialize;

use crate::models::element::ElementDescriptor;

/// 变更触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MutationTrigger {
    /// 新插入的节点（含其后代）
    #[serde(rename = "added")]
    NodeAdded,
    /// 图片 src / data-src 变化
    #[serde(rename = "img-src")]
    ImageSrcChanged,
    /// canvas 任意属性变化
    #[serde(rename = "canvas-attr")]
    CanvasAttrChanged,
    /// style 变化且设置了背景图
    #[serde(rename = "style-bg")]
    BackgroundStyleChanged,
    /// SVG 内部结构变化
    #[serde(rename = "svg-childlist")]
    SvgContentChanged,
}

impl MutationTrigger {
    /// 是否属于"复查"流程（需要等待渲染完成后重新分类）
    pub fn is_recheck(&self) -> bool {
        !matches!(self, MutationTrigger::NodeAdded)
    }
}

/// 单条变更记录
#[derive(Debug, Clone, Deserialize)]
pub struct MutationRecord {
    pub trigger: MutationTrigger,
    pub descriptor: ElementDescriptor,
}

/// 一个变更批次
///
/// `alive` 是当前仍然挂在文档上的元素 token 全集，
/// 用于指纹注册表的清理（元素消失后对应条目随之删除）。
#[derive(Debug, Clone, Deserialize)]
pub struct MutationBatch {
    pub records: Vec<MutationRecord>,
    pub alive: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_deserialize() {
        let json = r#"{
            "records": [
                {
                    "trigger": "img-src",
                    "descriptor": {
                        "token": "e7",
                        "kind": "img",
                        "width": 100,
                        "height": 40,
                        "ident": "captcha"
                    }
                }
            ],
            "alive": ["e7", "e9"]
        }"#;
        let batch: MutationBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].trigger, MutationTrigger::ImageSrcChanged);
        assert!(batch.records[0].trigger.is_recheck());
        assert_eq!(batch.alive, vec!["e7".to_string(), "e9".to_string()]);
    }

    #[test]
    fn test_added_is_not_recheck() {
        assert!(!MutationTrigger::NodeAdded.is_recheck());
        assert!(MutationTrigger::CanvasAttrChanged.is_recheck());
        assert!(MutationTrigger::SvgContentChanged.is_recheck());
    }
}
