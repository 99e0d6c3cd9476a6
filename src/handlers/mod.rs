//! 步骤 handler：每个 StepType 变体一个实现，统一 execute(step, ctx) 接口
//!
//! 分发是封闭标签联合：HandlerSet 对 StepType 做穷尽 match，新增变体时编译器强制
//! 补齐 handler，而不是开放式分支。handler 返回 Result<Value, String>；Err 由
//! Orchestrator 转为失败的步骤报告。

pub mod browser;
pub mod code;
pub mod file;
pub mod search;
pub mod think;

use async_trait::async_trait;
use serde_json::Value;

use crate::task::{ExecutionStep, StepType, TaskDescriptor, UploadedFile};

pub use browser::{BrowserAutomation, BrowserTaskHandler, UnconfiguredBrowser};
pub use code::CodeExecutionHandler;
pub use file::FileProcessingHandler;
pub use search::{SearchHandler, SearchProvider, WebFetchSearcher};
pub use think::ThinkHandler;

/// 跨步骤共享的只读上下文
pub struct SharedContext {
    pub request: String,
    pub descriptor: TaskDescriptor,
    pub files: Vec<UploadedFile>,
}

/// 步骤 handler trait：每个变体一个实现
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, step: &ExecutionStep, ctx: &SharedContext) -> Result<Value, String>;
}

/// 封闭的 handler 集合：每变体一个字段
pub struct HandlerSet {
    pub code: CodeExecutionHandler,
    pub browser: BrowserTaskHandler,
    pub file: FileProcessingHandler,
    pub search: SearchHandler,
    pub think: ThinkHandler,
}

impl HandlerSet {
    /// 穷尽分发：变体集合封闭，遗漏在编译期暴露
    pub fn handler(&self, step_type: StepType) -> &dyn StepHandler {
        match step_type {
            StepType::CodeExecution => &self.code,
            StepType::BrowserTask => &self.browser,
            StepType::FileProcessing => &self.file,
            StepType::Search => &self.search,
            StepType::Think => &self.think,
        }
    }
}

/// 从文本中提取 http(s) URL
pub(crate) fn extract_urls(text: &str) -> Vec<String> {
    let re = regex::Regex::new(r"https?://[^\s\)\]\}>,\x22']+").unwrap();
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_urls() {
        let urls = extract_urls("see https://docs.rs/tokio and (https://crates.io/crates/serde).");
        assert_eq!(urls, vec!["https://docs.rs/tokio", "https://crates.io/crates/serde"]);
    }

    #[test]
    fn test_extract_urls_none() {
        assert!(extract_urls("no links here").is_empty());
    }
}
