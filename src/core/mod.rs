//! 核心模块：错误类型与任务编排器

pub mod error;
pub mod orchestrator;

pub use error::AgentError;
pub use orchestrator::Orchestrator;
