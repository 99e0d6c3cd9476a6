//! 管线错误类型
//!
//! 传播策略：分类歧义在 IntentClassifier 内部回退；规划失败回退为单个默认步骤；
//! 沙箱内部失败转为失败的 ExecutionResult；协作方接缝沿用 Result<_, String>。
//! 真正到达 Orchestrator 顶层边界的只有这里的几个变体，统一转为整任务失败的
//! TaskResult，不向调用方抛出。

use thiserror::Error;

/// 到达编排层的错误：LLM 调用失败、步骤失败、任务取消
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Step '{step_id}' failed: {reason}")]
    StepFailed { step_id: String, reason: String },

    #[error("Task cancelled")]
    Cancelled,
}
