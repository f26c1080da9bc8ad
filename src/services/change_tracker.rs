//! 内容变化检测 - 业务能力层
//!
//! 每个存活元素最多保存一个指纹；没有记录一律视为"已变化"。
//! 只在一次识别成功派发之后才写入指纹，失败的尝试不留状态，
//! 下一轮扫描会自然重试。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::debug;

/// 内容变化跟踪器
///
/// token -> 指纹的注册表。注册表只做点查和写入，从不遍历；
/// 条目的生命周期跟随元素本身，元素从文档消失后由 `prune` 清理。
pub struct ChangeTracker {
    registry: Mutex<HashMap<String, String>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// 元素内容相对上次处理是否发生变化
    pub fn has_changed(&self, token: &str, fingerprint: &str) -> bool {
        let registry = self.registry.lock().unwrap();
        match registry.get(token) {
            Some(previous) => previous != fingerprint,
            None => true,
        }
    }

    /// 记录本次已处理的内容指纹
    pub fn mark_processed(&self, token: &str, fingerprint: String) {
        self.registry
            .lock()
            .unwrap()
            .insert(token.to_string(), fingerprint);
    }

    /// 清理已经不在文档上的元素条目
    pub fn prune(&self, alive: &[String]) {
        let alive: HashSet<&str> = alive.iter().map(|t| t.as_str()).collect();
        let mut registry = self.registry.lock().unwrap();
        let before = registry.len();
        registry.retain(|token, _| alive.contains(token.as_str()));
        let removed = before - registry.len();
        if removed > 0 {
            debug!("清理了 {} 个已消失元素的指纹", removed);
        }
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_element_is_changed() {
        let tracker = ChangeTracker::new();
        assert!(tracker.has_changed("e1", "src_120_40"));
    }

    #[test]
    fn test_same_fingerprint_is_unchanged() {
        let tracker = ChangeTracker::new();
        tracker.mark_processed("e1", "src_120_40".to_string());
        assert!(!tracker.has_changed("e1", "src_120_40"));
    }

    #[test]
    fn test_different_fingerprint_is_changed() {
        let tracker = ChangeTracker::new();
        tracker.mark_processed("e1", "src_120_40".to_string());
        // 任何组成部分变化（URL、尺寸、标记、背景值）都应翻转为已变化
        assert!(tracker.has_changed("e1", "src2_120_40"));
        assert!(tracker.has_changed("e1", "src_64_40"));
    }

    #[test]
    fn test_prune_drops_dead_tokens() {
        let tracker = ChangeTracker::new();
        tracker.mark_processed("e1", "a".to_string());
        tracker.mark_processed("e2", "b".to_string());

        tracker.prune(&["e2".to_string()]);

        // e1 被清理，再次出现时视为已变化
        assert!(tracker.has_changed("e1", "a"));
        assert!(!tracker.has_changed("e2", "b"));
    }
}
