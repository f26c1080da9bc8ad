//! 页面变更订阅 - 基础设施层
//!
//! 核心逻辑不关心宿主如何投递批量变更事件，只依赖这里的订阅接口。

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::infrastructure::page_agent::PageAgent;
use crate::models::mutation::MutationBatch;

/// 变更通知源
///
/// `subscribe` 返回一个批次流，`unsubscribe` 停止投递。
#[async_trait]
pub trait MutationSource: Send + Sync {
    async fn subscribe(&self) -> Result<mpsc::Receiver<MutationBatch>>;
    async fn unsubscribe(&self);
}

/// 基于 CDP 的变更通知源
///
/// 页面内 MutationObserver 把记录排入队列，这里按固定间隔拉取并
/// 转发到通道。每个批次都带存活 token 全集，即使没有新记录也会
/// 投递，供注册表清理使用。
pub struct CdpMutationSource {
    agent: PageAgent,
    drain_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CdpMutationSource {
    pub fn new(agent: PageAgent, drain_interval: Duration) -> Self {
        Self {
            agent,
            drain_interval,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MutationSource for CdpMutationSource {
    async fn subscribe(&self) -> Result<mpsc::Receiver<MutationBatch>> {
        self.agent.observe().await?;

        let (tx, rx) = mpsc::channel(16);
        let agent = self.agent.clone();
        let drain_interval = self.drain_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(drain_interval);
            loop {
                ticker.tick().await;
                match agent.drain().await {
                    Ok(batch) => {
                        if tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("拉取变更批次失败: {}", e);
                    }
                }
            }
        });

        *self.task.lock().unwrap() = Some(handle);
        Ok(rx)
    }

    async fn unsubscribe(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
        if let Err(e) = self.agent.disconnect().await {
            debug!("断开 MutationObserver 失败: {}", e);
        }
    }
}
