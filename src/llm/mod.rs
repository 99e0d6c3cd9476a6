//! LLM 客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::{MockLlmClient, ScriptedLlm};
pub use openai::OpenAiClient;
pub use traits::{CompletionOptions, LlmClient, Message, Role};

use crate::config::AppConfig;

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "mock" || !has_key {
        if provider != "mock" {
            tracing::warn!("No API key set, using Mock LLM");
        }
        return Arc::new(MockLlmClient);
    }

    tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
    Arc::new(OpenAiClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        std::env::var("OPENAI_API_KEY").ok().as_deref(),
        cfg.llm.request_timeout_secs,
    ))
}
