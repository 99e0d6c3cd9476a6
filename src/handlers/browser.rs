//! BrowserTask handler：站点交互的协作方接缝
//!
//! solve_browser_task(objective, starting_url, data) 由外部浏览器自动化能力实现；
//! 基础层只提供 UnconfiguredBrowser（确定性报错），真实实现（Headless Chrome 等）
//! 在部署侧注入。

use async_trait::async_trait;
use serde_json::Value;

use crate::handlers::{extract_urls, SharedContext, StepHandler};
use crate::task::ExecutionStep;

/// 浏览器自动化能力
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    async fn solve_browser_task(
        &self,
        objective: &str,
        starting_url: Option<&str>,
        data: &Value,
    ) -> Result<Value, String>;
}

/// 未配置浏览器时的默认实现
#[derive(Default)]
pub struct UnconfiguredBrowser;

#[async_trait]
impl BrowserAutomation for UnconfiguredBrowser {
    async fn solve_browser_task(
        &self,
        _objective: &str,
        _starting_url: Option<&str>,
        _data: &Value,
    ) -> Result<Value, String> {
        Err("Browser automation is not configured".to_string())
    }
}

/// BrowserTask 步骤 handler：从步骤文本抽取起始 URL 并委派给协作方
pub struct BrowserTaskHandler {
    browser: std::sync::Arc<dyn BrowserAutomation>,
}

impl BrowserTaskHandler {
    pub fn new(browser: std::sync::Arc<dyn BrowserAutomation>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl StepHandler for BrowserTaskHandler {
    async fn execute(&self, step: &ExecutionStep, _ctx: &SharedContext) -> Result<Value, String> {
        let starting_url = step
            .context
            .get("starting_url")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| extract_urls(&step.description).into_iter().next());

        let data = step
            .context
            .get("data")
            .cloned()
            .unwrap_or(Value::Null);

        self.browser
            .solve_browser_task(&step.description, starting_url.as_deref(), &data)
            .await
    }
}
