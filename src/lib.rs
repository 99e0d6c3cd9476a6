//! Wasp - Rust 自主任务智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与任务编排主循环
//! - **files**: 上传文件摄取（文本 / 表格 / JSON / 二进制）
//! - **handlers**: 五类执行步骤的处理器与协作方接口
//! - **intent**: 意图分类（LLM 分类 + 关键词回退）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 语义记忆（解法 / 反思记录，词元重叠检索）
//! - **reason**: 任务理解、执行规划、事后反思
//! - **sandbox**: 临时目录沙箱内的 Python 执行引擎
//! - **synth**: 动态代码合成（生成、校验、单次修复）
//! - **task**: 任务数据模型与产物提取

pub mod config;
pub mod core;
pub mod files;
pub mod handlers;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod reason;
pub mod sandbox;
pub mod synth;
pub mod task;

pub use crate::core::{AgentError, Orchestrator};
pub use task::{TaskDescriptor, TaskResult, UploadedFile};
