//! 生命周期事件
//!
//! 流水线在各阶段发出命名事件，供外部观察者（UI / 遥测）消费。
//! 事件发送永远不阻塞流水线，订阅方失效也不影响其他订阅方。

use tokio::sync::broadcast;

use crate::models::element::ElementKind;

/// 流水线生命周期事件
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// 候选元素分类通过
    DetectFound { token: String, kind: ElementKind },
    /// 识别开始
    RecognizeStart { token: String },
    /// 识别完成
    RecognizeComplete { token: String, text: String },
    /// 识别失败
    RecognizeError { token: String, message: String },
}

/// 事件总线
///
/// broadcast 通道的薄封装：没有订阅方或订阅方落后时发送直接丢弃。
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 发出事件（无人订阅时静默丢弃）
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        // 不应 panic，也不应返回错误
        bus.emit(PipelineEvent::RecognizeStart {
            token: "e1".to_string(),
        });
    }

    #[tokio::test]
    async fn test_all_subscribers_receive() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(PipelineEvent::RecognizeComplete {
            token: "e1".to_string(),
            text: "3kx9".to_string(),
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                PipelineEvent::RecognizeComplete { token, text } => {
                    assert_eq!(token, "e1");
                    assert_eq!(text, "3kx9");
                }
                other => panic!("收到意外事件: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let bus = EventBus::new(8);
        let rx_dropped = bus.subscribe();
        let mut rx_alive = bus.subscribe();
        drop(rx_dropped);

        bus.emit(PipelineEvent::RecognizeStart {
            token: "e2".to_string(),
        });

        assert!(matches!(
            rx_alive.recv().await.unwrap(),
            PipelineEvent::RecognizeStart { .. }
        ));
    }
}
