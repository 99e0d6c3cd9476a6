//! Think handler：纯推理步骤，一次 LLM 补全

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::handlers::{SharedContext, StepHandler};
use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::task::ExecutionStep;

const THINK_SYSTEM: &str =
    "You reason about one step of a larger task. Answer concisely with the reasoning result only.";

pub struct ThinkHandler {
    llm: Arc<dyn LlmClient>,
    opts: CompletionOptions,
}

impl ThinkHandler {
    pub fn new(llm: Arc<dyn LlmClient>, opts: CompletionOptions) -> Self {
        Self { llm, opts }
    }
}

#[async_trait]
impl StepHandler for ThinkHandler {
    async fn execute(&self, step: &ExecutionStep, ctx: &SharedContext) -> Result<Value, String> {
        let mut user = format!("Task: {}\nStep: {}", ctx.request, step.description);
        if let Some(previous) = step.context.get("previous_results") {
            user.push_str(&format!(
                "\nEarlier step outputs:\n{}",
                serde_json::to_string_pretty(previous).unwrap_or_default()
            ));
        }
        let messages = [Message::system(THINK_SYSTEM), Message::user(user)];
        let thought = self.llm.complete(&messages, &self.opts).await?;
        Ok(json!({"thought": thought}))
    }
}
