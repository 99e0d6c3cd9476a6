//! Mock LLM 客户端（用于测试与无 API Key 场景）
//!
//! MockLlmClient 回显最后一条 User 消息；ScriptedLlm 按顺序吐出预置响应，
//! 供集成测试精确驱动 分类 -> 理解 -> 规划 -> 合成 各次调用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionOptions, LlmClient, Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _opts: &CompletionOptions,
    ) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 脚本化客户端：每次 complete 弹出队首响应；队列耗尽返回错误
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    /// 剩余未消费的响应数
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        _messages: &[Message],
        _opts: &CompletionOptions,
    ) -> Result<String, String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("ScriptedLlm: no responses left".to_string()))
    }
}
