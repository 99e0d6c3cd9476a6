//! 沙箱执行：临时目录、硬超时、输出截断

pub mod engine;

pub use engine::{
    truncate_output, ExecutionResult, SandboxConfig, SandboxEngine, SUPPORTED_LANGUAGE,
    TRUNCATION_MARKER,
};
