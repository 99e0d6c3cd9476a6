//! 任务编排器：主控循环
//!
//! 分类 -> 理解 -> 检索历史解法 -> 规划 -> 逐步执行（按类型分发、失败即停）->
//! 反思（总是执行）-> 全部成功时持久化解法 -> 汇总产物。所有组件都是
//! 每实例显式状态，随编排器构造 / 销毁，无全局注册表与惰性初始化。
//! 顶层边界捕获一切意外错误并转为整任务失败的 TaskResult，不向调用方抛出。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::files::{FileIngestor, LocalFileIngestor};
use crate::handlers::{
    BrowserAutomation, BrowserTaskHandler, CodeExecutionHandler, FileProcessingHandler,
    HandlerSet, SearchHandler, SearchProvider, SharedContext, ThinkHandler, UnconfiguredBrowser,
    WebFetchSearcher,
};
use crate::intent::IntentClassifier;
use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::memory::{MemoryKind, SemanticMemory};
use crate::reason::{Reflector, TaskPlanner, Understander};
use crate::sandbox::{SandboxConfig, SandboxEngine};
use crate::synth::CodeSynthesizer;
use crate::task::{
    extract_artifacts, ExecutionPlan, ExecutionStep, SolutionRecord, StepReport, StepType,
    TaskCategory, TaskDescriptor, TaskResult, UploadedFile,
};

/// 任务编排器：持有全部子组件的每实例状态
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn SemanticMemory>,
    classifier: IntentClassifier,
    understander: Understander,
    planner: TaskPlanner,
    reflector: Reflector,
    handlers: HandlerSet,
    opts: CompletionOptions,
    /// 规划前检索的历史解法条数
    retrieve_k: usize,
    /// 单步超时硬上限（秒），规划给出的超时超过时被压到该值
    max_step_timeout_secs: u64,
}

impl Orchestrator {
    /// 按配置装配全部子组件；浏览器 / 检索 / 摄取协作方可用 with_* 替换
    pub fn new(cfg: &AppConfig, llm: Arc<dyn LlmClient>, memory: Arc<dyn SemanticMemory>) -> Self {
        let opts = CompletionOptions::default()
            .with_temperature(cfg.llm.temperature)
            .with_max_tokens(cfg.llm.max_tokens);

        let sandbox_config = SandboxConfig {
            python_bin: cfg.sandbox.python_bin.clone(),
            max_output_chars: cfg.sandbox.max_output_chars,
        };
        let synthesizer = CodeSynthesizer::new(
            llm.clone(),
            memory.clone(),
            opts.clone(),
            cfg.memory.retrieve_k,
        );
        let handlers = HandlerSet {
            code: CodeExecutionHandler::new(synthesizer, SandboxEngine::new(sandbox_config)),
            browser: BrowserTaskHandler::new(Arc::new(UnconfiguredBrowser)),
            file: FileProcessingHandler::new(Arc::new(LocalFileIngestor::default())),
            search: SearchHandler::new(Arc::new(WebFetchSearcher::new(&cfg.search))),
            think: ThinkHandler::new(llm.clone(), opts.clone()),
        };

        Self {
            classifier: IntentClassifier::new(llm.clone(), opts.clone()),
            understander: Understander::new(llm.clone(), opts.clone()),
            planner: TaskPlanner::new(llm.clone(), opts.clone(), cfg.planner.clone()),
            reflector: Reflector::new(memory.clone()),
            handlers,
            retrieve_k: cfg.memory.retrieve_k,
            max_step_timeout_secs: cfg.sandbox.timeout_secs,
            opts,
            llm,
            memory,
        }
    }

    /// 注入真实的浏览器自动化协作方
    pub fn with_browser(mut self, browser: Arc<dyn BrowserAutomation>) -> Self {
        self.handlers.browser = BrowserTaskHandler::new(browser);
        self
    }

    /// 注入自定义检索协作方
    pub fn with_search_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.handlers.search = SearchHandler::new(provider);
        self
    }

    /// 注入自定义文件摄取协作方
    pub fn with_ingestor(mut self, ingestor: Arc<dyn FileIngestor>) -> Self {
        self.handlers.file = FileProcessingHandler::new(ingestor);
        self
    }

    /// 处理一个请求：总是返回良构的 TaskResult（顶层异常边界）
    pub async fn handle_request(
        &self,
        request: &str,
        files: &[UploadedFile],
        history: &[Message],
        precomputed: Option<TaskDescriptor>,
        cancel: CancellationToken,
    ) -> TaskResult {
        let start = Instant::now();
        match self.run(request, files, history, precomputed, &cancel).await {
            Ok(mut result) => {
                result.execution_time_ms = start.elapsed().as_millis() as u64;
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "task failed at top boundary");
                TaskResult::failure(e.to_string(), start.elapsed().as_millis() as u64)
            }
        }
    }

    async fn run(
        &self,
        request: &str,
        files: &[UploadedFile],
        history: &[Message],
        precomputed: Option<TaskDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, AgentError> {
        // 预计算的分类可短路重新分类
        let descriptor = match precomputed {
            Some(d) => d,
            None => self.classifier.classify(request, history, files).await,
        };
        tracing::info!(
            category = ?descriptor.category,
            confidence = descriptor.confidence,
            "request classified"
        );

        // 纯对话：直接回复，不产生执行计划
        if descriptor.category == TaskCategory::Conversation {
            return self.converse(request, history).await;
        }

        let understanding = self.understander.understand(request, files, &descriptor).await;
        let past_solutions = self
            .memory
            .search(request, MemoryKind::Solution, self.retrieve_k);
        let mut plan = self
            .planner
            .plan(request, &understanding, &past_solutions, files)
            .await;
        tracing::info!(
            plan_id = %plan.id,
            steps = plan.steps.len(),
            estimated_secs = plan.estimated_secs,
            "plan built"
        );

        let reports = self.execute_plan(&descriptor, &mut plan, files, cancel).await;

        // 反思总是执行，无论成功还是中途失败
        let ratio = self.reflector.reflect(&descriptor, &plan, &reports);
        tracing::info!(success_ratio = ratio, "task reflected");

        let full_success =
            reports.len() == plan.steps.len() && reports.iter().all(|r| r.success);
        if full_success {
            self.persist_solution(&descriptor, &plan);
        }

        let error = reports.iter().find(|r| !r.success).map(|r| {
            AgentError::StepFailed {
                step_id: r.step_id.clone(),
                reason: format!(
                    "{}: {}",
                    r.description,
                    r.error.as_deref().unwrap_or("unknown error")
                ),
            }
            .to_string()
        });
        let artifacts = extract_artifacts(&reports);

        Ok(TaskResult {
            success: full_success,
            results: reports,
            artifacts,
            error,
            execution_time_ms: 0, // 调用方填充
        })
    }

    /// 纯对话回复：单次补全包装为 TaskResult
    async fn converse(
        &self,
        request: &str,
        history: &[Message],
    ) -> Result<TaskResult, AgentError> {
        let mut messages =
            vec![Message::system("You are a helpful assistant. Answer directly.")];
        messages.extend(history.iter().cloned());
        messages.push(Message::user(request));
        let response = self
            .llm
            .complete(&messages, &self.opts)
            .await
            .map_err(AgentError::LlmError)?;

        Ok(TaskResult {
            success: true,
            results: vec![StepReport {
                step_id: "conversation".to_string(),
                step_type: StepType::Think,
                description: "direct conversational reply".to_string(),
                success: true,
                output: json!({"response": response}),
                error: None,
            }],
            artifacts: Vec::new(),
            error: None,
            execution_time_ms: 0,
        })
    }

    /// 顺序执行步骤：失败即停（所有步骤均视为关键），结果折叠进后续步骤上下文
    async fn execute_plan(
        &self,
        descriptor: &TaskDescriptor,
        plan: &mut ExecutionPlan,
        files: &[UploadedFile],
        cancel: &CancellationToken,
    ) -> Vec<StepReport> {
        let ctx = SharedContext {
            request: plan.request.clone(),
            descriptor: descriptor.clone(),
            files: files.to_vec(),
        };
        let mut reports: Vec<StepReport> = Vec::new();
        let mut previous_results: Vec<Value> = Vec::new();

        for step in &mut plan.steps {
            step.timeout_secs = step.timeout_secs.min(self.max_step_timeout_secs);
            if !previous_results.is_empty() {
                step.context
                    .insert("previous_results".to_string(), json!(previous_results));
            }

            let report = self.execute_step(step, &ctx, cancel).await;
            step.result = Some(report.output.clone());
            step.success = Some(report.success);
            step.error = report.error.clone();

            previous_results.push(json!({
                "step": step.description,
                "type": step.step_type,
                "output": report.output,
            }));
            let halted = !report.success;
            reports.push(report);
            if halted {
                tracing::warn!(step_id = %step.id, "step failed, halting plan");
                break;
            }
        }
        reports
    }

    /// 单步执行：按类型分发、墙钟硬超时、取消竞争、错误捕获、结构化审计日志
    async fn execute_step(
        &self,
        step: &ExecutionStep,
        ctx: &SharedContext,
        cancel: &CancellationToken,
    ) -> StepReport {
        let start = Instant::now();
        let handler = self.handlers.handler(step.step_type);
        // timeout_secs 对所有步骤类型生效，不只是沙箱内部的那一份
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled.to_string()),
            outcome = timeout(
                Duration::from_secs(step.timeout_secs),
                handler.execute(step, ctx),
            ) => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(format!("Step timed out after {}s", step.timeout_secs)),
            },
        };

        let (success, output, error) = match outcome {
            Ok(value) => {
                let success = Self::step_success(step.step_type, &value);
                let error = if success {
                    None
                } else {
                    value
                        .get("error")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .or_else(|| Some("step reported failure".to_string()))
                };
                (success, value, error)
            }
            Err(e) => (false, Value::Null, Some(e)),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = json!({
            "event": "step_audit",
            "step_id": step.id,
            "type": step.step_type,
            "ok": success,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "step");

        StepReport {
            step_id: step.id.clone(),
            step_type: step.step_type,
            description: step.description.clone(),
            success,
            output,
            error,
        }
    }

    /// 成功判定。CodeExecution 读沙箱的显式执行标志；其余类型沿用原始语义，
    /// 以 error 字段缺失（或为 null）作为成功——该不对称是已知的脆弱点，集中在此一处。
    fn step_success(step_type: StepType, value: &Value) -> bool {
        match step_type {
            StepType::CodeExecution => value
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            StepType::BrowserTask
            | StepType::FileProcessing
            | StepType::Search
            | StepType::Think => matches!(value.get("error"), None | Some(Value::Null)),
        }
    }

    /// 全部成功时持久化一条（且仅一条）解法记录
    fn persist_solution(&self, descriptor: &TaskDescriptor, plan: &ExecutionPlan) {
        let record = SolutionRecord {
            request: plan.request.clone(),
            steps: plan
                .steps
                .iter()
                .map(|s| (s.step_type, s.description.clone()))
                .collect(),
            success: true,
            created_at: chrono::Utc::now(),
        };
        let content = match serde_json::to_string(&record) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "solution record serialization failed");
                return;
            }
        };
        let category = serde_json::to_value(descriptor.category)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "unknown".to_string());
        if let Err(e) = self.memory.add(
            &content,
            MemoryKind::Solution,
            &[category, "known_good_plan".to_string()],
            json!({"plan_id": plan.id, "steps": plan.steps.len()}),
        ) {
            tracing::warn!(error = %e, "solution persistence failed (non-fatal)");
        } else {
            tracing::info!(plan_id = %plan.id, "solution persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_success_requires_explicit_flag() {
        // 显式标志缺失即失败，不能从「没有 error 字段」推断成功
        assert!(!Orchestrator::step_success(
            StepType::CodeExecution,
            &json!({"stdout": "looks fine"})
        ));
        assert!(Orchestrator::step_success(
            StepType::CodeExecution,
            &json!({"success": true})
        ));
        assert!(!Orchestrator::step_success(
            StepType::CodeExecution,
            &json!({"success": false, "error": "exit 1"})
        ));
    }

    #[test]
    fn test_other_types_infer_from_error_absence() {
        assert!(Orchestrator::step_success(StepType::Search, &json!({"sources": []})));
        assert!(Orchestrator::step_success(StepType::Think, &json!({"error": null})));
        assert!(!Orchestrator::step_success(
            StepType::BrowserTask,
            &json!({"error": "navigation failed"})
        ));
    }
}
