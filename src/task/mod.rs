//! 任务数据模型与产物提取

pub mod artifacts;
pub mod types;

pub use artifacts::extract_artifacts;
pub use types::{
    Artifact, ArtifactKind, DeliverableSpec, ExecutionPlan, ExecutionStep, SolutionRecord,
    StepReport, StepType, TaskCategory, TaskDescriptor, TaskFlags, TaskResult, UploadedFile,
};
