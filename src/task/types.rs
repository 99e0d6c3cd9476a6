//! 任务管线核心数据类型
//!
//! 定义任务描述、执行计划、步骤、结果与产物等类型。TaskDescriptor 由分类器产出后
//! 下游只读；ExecutionStep 是执行期间唯一被原地修改的实体。

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 任务类别（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// 纯对话，无需管线
    Conversation,
    DocumentCreation,
    PresentationCreation,
    SpreadsheetCreation,
    Analysis,
    Research,
    Automation,
    CodeGeneration,
    FileProcessing,
    Mixed,
}

impl TaskCategory {
    /// 创建类任务（需要产出具体文件名）
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            TaskCategory::DocumentCreation
                | TaskCategory::PresentationCreation
                | TaskCategory::SpreadsheetCreation
        )
    }
}

/// 交付物说明：文件名、格式、大纲、风格
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliverableSpec {
    pub filename: Option<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub outline: Vec<String>,
    pub style: Option<String>,
}

/// 任务标志位
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskFlags {
    pub needs_network: bool,
    pub needs_files: bool,
    /// 交付物需要非平凡合成时为 true；纯对话恒为 false
    pub needs_background: bool,
}

/// 任务描述：分类器对自由文本请求的结构化判定，产出后下游只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// 原始意图文本
    pub intent: String,
    pub category: TaskCategory,
    /// 置信度 [0,1]
    pub confidence: f32,
    #[serde(default)]
    pub deliverable: DeliverableSpec,
    #[serde(default)]
    pub flags: TaskFlags,
}

/// 步骤类型（封闭集合，每个变体对应一个 handler）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    CodeExecution,
    BrowserTask,
    FileProcessing,
    Search,
    Think,
}

/// 计划中的一步；result / success / error 在执行后填充
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: String,
    pub step_type: StepType,
    pub description: String,
    /// 注入的上下文（理解记录、之前步骤的输出等）
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionStep {
    pub fn new(step_type: StepType, description: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step_type,
            description: description.into(),
            context: BTreeMap::new(),
            timeout_secs,
            result: None,
            success: None,
            error: None,
        }
    }
}

/// 执行计划：Planner 一次性构建，Orchestrator 按序遍历并修改其中的步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    /// 源请求文本
    pub request: String,
    /// 至少 1 步
    pub steps: Vec<ExecutionStep>,
    /// 各步骤超时之和（秒）
    pub estimated_secs: u64,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn new(request: impl Into<String>, steps: Vec<ExecutionStep>, confidence: f32) -> Self {
        let estimated_secs = steps.iter().map(|s| s.timeout_secs).sum();
        Self {
            id: Uuid::new_v4().to_string(),
            request: request.into(),
            steps,
            estimated_secs,
            confidence,
            created_at: Utc::now(),
        }
    }
}

/// 上传文件描述符（上游输入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub media_type: String,
    pub size: u64,
}

/// 单步执行报告（TaskResult.results 的元素）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: String,
    pub step_type: StepType,
    pub description: String,
    pub success: bool,
    /// handler 返回的结构化输出
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 产物类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    File,
    Image,
}

/// 步骤副作用产物：仅存路径 / URL，不存二进制内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub location: String,
    /// 产生该产物的步骤
    pub step_id: String,
}

/// 任务终态：整体成功为已执行步骤成功的逻辑与；失败前的部分进度保留在 results 中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub results: Vec<StepReport>,
    pub artifacts: Vec<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl TaskResult {
    /// 整任务失败（顶层异常边界使用）
    pub fn failure(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            artifacts: Vec::new(),
            error: Some(error.into()),
            execution_time_ms,
        }
    }
}

/// 成功解法的持久化摘要：仅当计划每一步都成功时写入语义记忆，
/// 引导后续规划复用已知可行的分解
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionRecord {
    pub request: String,
    /// 计划骨架：(步骤类型, 描述)
    pub steps: Vec<(StepType, String)>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_estimated_secs_is_sum_of_timeouts() {
        let steps = vec![
            ExecutionStep::new(StepType::Search, "find sources", 30),
            ExecutionStep::new(StepType::CodeExecution, "build report", 60),
        ];
        let plan = ExecutionPlan::new("research X", steps, 0.8);
        assert_eq!(plan.estimated_secs, 90);
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn test_category_creation_flag() {
        assert!(TaskCategory::DocumentCreation.is_creation());
        assert!(TaskCategory::SpreadsheetCreation.is_creation());
        assert!(!TaskCategory::Research.is_creation());
        assert!(!TaskCategory::Conversation.is_creation());
    }

    #[test]
    fn test_step_type_serde_snake_case() {
        let json = serde_json::to_string(&StepType::CodeExecution).unwrap();
        assert_eq!(json, "\"code_execution\"");
        let back: StepType = serde_json::from_str("\"browser_task\"").unwrap();
        assert_eq!(back, StepType::BrowserTask);
    }
}
