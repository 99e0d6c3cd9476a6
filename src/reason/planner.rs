//! Reasoner - Planner：把理解记录分解为有序的最小执行计划
//!
//! 偏向最小充分计划：创作类任务应收敛为单个 CodeExecution 步骤；Search 仅用于 research
//! 原型；FileProcessing 仅在有附件时出现。代码侧后置过滤强制剥离「创作原型 + 无网络」
//! 任务中的 Search/Think 步骤——Planner 不得对纯合成任务投机加入检索。
//! 规划彻底失败或过滤后为空时，回退为等于原始请求的单个 CodeExecution 步骤，保证 ≥1 步。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::config::PlannerSection;
use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::memory::MemoryRecord;
use crate::reason::{extract_json_block, TaskArchetype, Understanding};
use crate::task::{ExecutionPlan, ExecutionStep, StepType, UploadedFile};

const PLAN_SYSTEM: &str = r#"You decompose a task into the SMALLEST sufficient ordered plan.
Respond with ONE JSON object only:
{
  "steps": [
    {"type": "code_execution" | "browser_task" | "file_processing" | "search" | "think",
     "description": "<what this step does>",
     "timeout_secs": <integer, optional>}
  ],
  "confidence": <0.0-1.0, optional>
}
Rules:
- Creation tasks (documents, presentations, spreadsheets from existing knowledge): EXACTLY ONE code_execution step.
- Add a search step ONLY for research tasks that need current external information.
- Add a file_processing step ONLY when files are attached.
- Add a browser_task step ONLY when the request explicitly requires interacting with a website.
- Never add speculative research to pure synthesis work."#;

/// LLM 返回的原始计划
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    steps: Vec<RawStep>,
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(rename = "type")]
    step_type: StepType,
    description: String,
    timeout_secs: Option<u64>,
}

/// TaskPlanner：LLM 规划 + 确定性过滤 + 单步回退
pub struct TaskPlanner {
    llm: Arc<dyn LlmClient>,
    opts: CompletionOptions,
    config: PlannerSection,
}

impl TaskPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, opts: CompletionOptions, config: PlannerSection) -> Self {
        Self { llm, opts, config }
    }

    pub async fn plan(
        &self,
        request: &str,
        understanding: &Understanding,
        past_solutions: &[MemoryRecord],
        files: &[UploadedFile],
    ) -> ExecutionPlan {
        let raw = match self.ask_llm(request, understanding, past_solutions, files).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "planning failed, falling back to single code step");
                return self.fallback_plan(request, understanding);
            }
        };

        let confidence = raw
            .confidence
            .unwrap_or(self.config.default_confidence)
            .clamp(0.0, 1.0);

        let mut steps: Vec<ExecutionStep> = raw
            .steps
            .into_iter()
            .take(self.config.max_steps)
            .filter(|s| self.keep_step(s.step_type, understanding, files))
            .map(|s| {
                ExecutionStep::new(
                    s.step_type,
                    s.description,
                    s.timeout_secs
                        .unwrap_or(self.config.default_step_timeout_secs),
                )
            })
            .collect();

        if steps.is_empty() {
            tracing::warn!("plan empty after filtering, falling back to single code step");
            return self.fallback_plan(request, understanding);
        }

        for step in &mut steps {
            step.context
                .insert("understanding".to_string(), json!(understanding));
        }

        ExecutionPlan::new(request, steps, confidence)
    }

    /// 后置过滤：创作原型 + 无网络的任务剥离 Search/Think；无附件时剥离 FileProcessing
    fn keep_step(
        &self,
        step_type: StepType,
        understanding: &Understanding,
        files: &[UploadedFile],
    ) -> bool {
        let pure_synthesis =
            understanding.archetype == TaskArchetype::Creation && !understanding.needs_internet;
        match step_type {
            StepType::Search | StepType::Think if pure_synthesis => false,
            StepType::FileProcessing if files.is_empty() => false,
            _ => true,
        }
    }

    /// 保证 ≥1 步：单个 CodeExecution，描述即原始请求
    fn fallback_plan(&self, request: &str, understanding: &Understanding) -> ExecutionPlan {
        let mut step = ExecutionStep::new(
            StepType::CodeExecution,
            request,
            self.config.default_step_timeout_secs,
        );
        step.context
            .insert("understanding".to_string(), json!(understanding));
        ExecutionPlan::new(request, vec![step], self.config.default_confidence)
    }

    async fn ask_llm(
        &self,
        request: &str,
        understanding: &Understanding,
        past_solutions: &[MemoryRecord],
        files: &[UploadedFile],
    ) -> Result<RawPlan, String> {
        let mut user = format!(
            "Request: {}\n\nUnderstanding:\n{}",
            request,
            serde_json::to_string_pretty(understanding).unwrap_or_default()
        );
        if !files.is_empty() {
            let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
            user.push_str(&format!("\n\nAttached files: {}", names.join(", ")));
        }
        if !past_solutions.is_empty() {
            user.push_str("\n\nKnown-good decompositions of similar requests:");
            for record in past_solutions {
                user.push_str(&format!("\n- {}", record.content));
            }
        }

        let messages = [Message::system(PLAN_SYSTEM), Message::user(user)];
        let output = self.llm.complete(&messages, &self.opts).await?;
        let json_str =
            extract_json_block(&output).ok_or_else(|| "No JSON in plan output".to_string())?;
        serde_json::from_str::<RawPlan>(json_str).map_err(|e| format!("Parse plan: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;

    fn planner(responses: Vec<Result<String, String>>) -> TaskPlanner {
        TaskPlanner::new(
            Arc::new(ScriptedLlm::new(responses)),
            CompletionOptions::default(),
            PlannerSection::default(),
        )
    }

    fn creation_understanding() -> Understanding {
        Understanding {
            archetype: TaskArchetype::Creation,
            needs_internet: false,
            ..Understanding::minimal("create a document about photosynthesis")
        }
    }

    #[tokio::test]
    async fn test_filter_strips_search_and_think_for_pure_synthesis() {
        let p = planner(vec![Ok(r#"{
            "steps": [
                {"type": "search", "description": "look up photosynthesis"},
                {"type": "code_execution", "description": "generate the document", "timeout_secs": 90},
                {"type": "think", "description": "review the result"}
            ],
            "confidence": 0.9
        }"#
        .to_string())]);
        let plan = p
            .plan("create a document", &creation_understanding(), &[], &[])
            .await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type, StepType::CodeExecution);
        assert_eq!(plan.steps[0].timeout_secs, 90);
        assert_eq!(plan.estimated_secs, 90);
    }

    #[tokio::test]
    async fn test_research_plan_keeps_search() {
        let u = Understanding {
            archetype: TaskArchetype::Research,
            needs_internet: true,
            ..Understanding::minimal("research prices")
        };
        let p = planner(vec![Ok(r#"{
            "steps": [
                {"type": "search", "description": "fetch current price"},
                {"type": "code_execution", "description": "summarize findings"}
            ]
        }"#
        .to_string())]);
        let plan = p.plan("research prices", &u, &[], &[]).await;
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].step_type, StepType::Search);
        // confidence 默认 0.8
        assert!((plan.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_file_processing_dropped_without_attachments() {
        let u = Understanding {
            archetype: TaskArchetype::Analysis,
            ..Understanding::minimal("analyze data")
        };
        let p = planner(vec![Ok(r#"{
            "steps": [
                {"type": "file_processing", "description": "ingest the csv"},
                {"type": "code_execution", "description": "run the analysis"}
            ]
        }"#
        .to_string())]);
        let plan = p.plan("analyze data", &u, &[], &[]).await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type, StepType::CodeExecution);
    }

    #[tokio::test]
    async fn test_fallback_on_unparseable_output() {
        let p = planner(vec![Ok("I think we should start by...".to_string())]);
        let plan = p
            .plan("build me a report", &creation_understanding(), &[], &[])
            .await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type, StepType::CodeExecution);
        assert_eq!(plan.steps[0].description, "build me a report");
    }

    #[tokio::test]
    async fn test_fallback_when_filter_empties_plan() {
        let p = planner(vec![Ok(r#"{
            "steps": [{"type": "think", "description": "ponder"}]
        }"#
        .to_string())]);
        let plan = p
            .plan("write a poem file", &creation_understanding(), &[], &[])
            .await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type, StepType::CodeExecution);
    }

    #[tokio::test]
    async fn test_understanding_injected_into_step_context() {
        let p = planner(vec![Ok(r#"{
            "steps": [{"type": "code_execution", "description": "do it"}]
        }"#
        .to_string())]);
        let plan = p
            .plan("create a doc", &creation_understanding(), &[], &[])
            .await;
        let ctx = plan.steps[0].context.get("understanding").unwrap();
        assert_eq!(ctx.get("archetype").unwrap(), "creation");
    }
}
