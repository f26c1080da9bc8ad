//! 输入框绑定 - 业务能力层
//!
//! 识别开始前清空关联输入框里的旧猜测，识别成功后重新查找并填入。
//! 输入框从不持有，每次填充都重新解析。
//!
//! 查找优先级（页面侧实现）：
//! 1. 全局配置的输入框选择器
//! 2. 最近的 form 内第一个命中关键词的文本类输入框
//! 3. 向上最多五层祖先，各自子树内命中关键词的输入框
//! 4. 全页命中关键词的输入框中视口距离最近的一个

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::infrastructure::page_agent::PageAgent;

/// 输入框绑定器
#[derive(Clone)]
pub struct InputBinder {
    keywords: Vec<String>,
    input_selector: Option<String>,
}

impl InputBinder {
    pub fn new(config: &Config) -> Self {
        let input_selector = {
            let s = config.input_selector.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        Self {
            keywords: config.keyword_list(),
            input_selector,
        }
    }

    /// 识别开始前清空旧的验证码输入，避免旧猜测被提交
    pub async fn clear_previous(&self, agent: &PageAgent, token: &str) -> Result<()> {
        let Some(input_token) = self.resolve(agent, token).await? else {
            return Ok(());
        };
        let value = agent.input_value(&input_token).await?.unwrap_or_default();
        if value.trim().is_empty() {
            return Ok(());
        }
        info!("🧹 清空旧的验证码输入");
        agent.clear_input(&input_token).await?;
        Ok(())
    }

    /// 把识别结果填入关联输入框
    ///
    /// 找不到输入框时静默放弃（只记日志），返回 false
    pub async fn fill(&self, agent: &PageAgent, token: &str, text: &str) -> Result<bool> {
        let Some(input_token) = self.resolve(agent, token).await? else {
            warn!("⚠️ 未找到验证码输入框");
            return Ok(false);
        };

        info!("📝 填充验证码: {}", text);
        let filled = agent.fill_input(&input_token, text).await?;
        if !filled {
            warn!("⚠️ 输入框在填充前消失");
        }
        Ok(filled)
    }

    async fn resolve(&self, agent: &PageAgent, token: &str) -> Result<Option<String>> {
        let input_token = agent
            .find_input(token, &self.keywords, self.input_selector.as_deref())
            .await?;
        if let Some(ref t) = input_token {
            debug!("解析到输入框: {}", t);
        }
        Ok(input_token)
    }
}
