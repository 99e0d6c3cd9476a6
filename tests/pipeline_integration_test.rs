//! 管线集成测试：用脚本化 LLM 精确驱动 分类 -> 理解 -> 规划 -> 执行 -> 反思 全链路
//!
//! 沙箱解释器指向 sh，保证无 Python 环境时用例仍自洽；脚本化响应按管线调用顺序
//! 逐个消费，末尾断言 remaining() == 0 以锁定调用次数。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use wasp::config::AppConfig;
use wasp::llm::ScriptedLlm;
use wasp::memory::{InMemorySemanticStore, MemoryKind, SemanticMemory};
use wasp::task::{
    ArtifactKind, DeliverableSpec, StepType, TaskCategory, TaskDescriptor, TaskFlags,
};
use wasp::Orchestrator;

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.llm.provider = "mock".to_string();
    cfg.sandbox.python_bin = "sh".to_string();
    cfg
}

fn descriptor(category: TaskCategory, intent: &str) -> TaskDescriptor {
    TaskDescriptor {
        intent: intent.to_string(),
        category,
        confidence: 0.9,
        deliverable: DeliverableSpec::default(),
        flags: TaskFlags {
            needs_network: category == TaskCategory::Research,
            needs_files: false,
            needs_background: category != TaskCategory::Conversation,
        },
    }
}

fn build(
    responses: Vec<Result<String, String>>,
) -> (Orchestrator, Arc<ScriptedLlm>, Arc<InMemorySemanticStore>) {
    let llm = Arc::new(ScriptedLlm::new(responses));
    let memory = Arc::new(InMemorySemanticStore::new(100));
    let orchestrator = Orchestrator::new(&test_config(), llm.clone(), memory.clone());
    (orchestrator, llm, memory)
}

const CREATION_UNDERSTANDING: &str = r#"{
    "intent": "write a one-page photosynthesis overview",
    "topic": "photosynthesis",
    "archetype": "creation",
    "output_format": "docx",
    "output_filename": "photosynthesis_overview.docx",
    "requirements": ["one page"],
    "approach": "generate the document from existing knowledge",
    "needs_internet": false,
    "complexity": "low"
}"#;

const RESEARCH_UNDERSTANDING: &str = r#"{
    "intent": "find the current price",
    "topic": "price research",
    "archetype": "research",
    "output_format": "md",
    "output_filename": null,
    "requirements": [],
    "approach": "fetch sources then summarize",
    "needs_internet": true,
    "complexity": "medium"
}"#;

/// 单步 code_execution 计划
const SINGLE_CODE_PLAN: &str = r#"{
    "steps": [
        {"type": "code_execution", "description": "generate the photosynthesis document", "timeout_secs": 30}
    ],
    "confidence": 0.9
}"#;

fn fenced(body: &str) -> String {
    format!("```python\n{}\n```", body)
}

#[tokio::test]
async fn test_conversation_never_builds_a_plan() {
    let (orchestrator, llm, memory) = build(vec![Ok("Hi! Doing great, thanks.".to_string())]);
    let result = orchestrator
        .handle_request(
            "how are you today?",
            &[],
            &[],
            Some(descriptor(TaskCategory::Conversation, "how are you today?")),
            CancellationToken::new(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].step_id, "conversation");
    assert_eq!(result.results[0].output["response"], "Hi! Doing great, thanks.");
    assert!(result.artifacts.is_empty());
    // 对话路径不经过规划 / 执行 / 反思：唯一一次 LLM 调用即回复本身
    assert_eq!(llm.remaining(), 0);
    assert_eq!(memory.count(MemoryKind::Solution), 0);
    assert_eq!(memory.count(MemoryKind::Reflection), 0);
}

#[tokio::test]
async fn test_classified_conversation_answers_directly() {
    // 未传预计算描述符：第一条脚本响应被分类器消费
    let (orchestrator, llm, _) = build(vec![
        Ok(r#"{"category": "conversation", "confidence": 0.98}"#.to_string()),
        Ok("Rust is a systems programming language.".to_string()),
    ]);
    let result = orchestrator
        .handle_request("what is Rust?", &[], &[], None, CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(
        result.results[0].output["response"],
        "Rust is a systems programming language."
    );
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_creation_full_success_persists_one_solution_and_artifact() {
    let script = fenced(
        r#"printf '{"success": true, "summary": "done", "generated_files": ["photosynthesis_overview.docx"]}'"#,
    );
    let (orchestrator, llm, memory) = build(vec![
        Ok(CREATION_UNDERSTANDING.to_string()),
        Ok(SINGLE_CODE_PLAN.to_string()),
        Ok(script),
    ]);

    let request = "create a one-page document about photosynthesis";
    let result = orchestrator
        .handle_request(
            request,
            &[],
            &[],
            Some(descriptor(TaskCategory::DocumentCreation, request)),
            CancellationToken::new(),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].step_type, StepType::CodeExecution);
    assert!(result.results[0].success);
    assert!(result.error.is_none());

    // 结构化 stdout 中的 generated_files 成为产物
    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(result.artifacts[0].kind, ArtifactKind::File);
    assert_eq!(result.artifacts[0].location, "photosynthesis_overview.docx");

    // 全部成功：恰好一条解法记录 + 一条反思记录
    assert_eq!(memory.count(MemoryKind::Solution), 1);
    let solutions = memory.records(MemoryKind::Solution);
    assert!(solutions[0].content.contains("photosynthesis"));
    assert!(solutions[0].tags.contains(&"document_creation".to_string()));

    let reflections = memory.records(MemoryKind::Reflection);
    assert_eq!(reflections.len(), 1);
    assert!(reflections[0].content.contains("Success ratio: 1.00"));

    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_plan_halts_at_first_failure() {
    let plan = r#"{
        "steps": [
            {"type": "code_execution", "description": "prepare the data", "timeout_secs": 30},
            {"type": "code_execution", "description": "crunch the numbers", "timeout_secs": 30},
            {"type": "code_execution", "description": "write the summary", "timeout_secs": 30}
        ]
    }"#;
    let (orchestrator, llm, memory) = build(vec![
        Ok(RESEARCH_UNDERSTANDING.to_string()),
        Ok(plan.to_string()),
        Ok(fenced(r#"printf '{"success": true}'"#)),
        Ok(fenced("echo broken >&2; exit 7")),
        // 第三步的合成响应故意不提供：中止后不得再有 LLM 调用
    ]);

    let request = "research and summarize the numbers";
    let result = orchestrator
        .handle_request(
            request,
            &[],
            &[],
            Some(descriptor(TaskCategory::Research, request)),
            CancellationToken::new(),
        )
        .await;

    assert!(!result.success);
    // 第三步未执行
    assert_eq!(result.results.len(), 2);
    assert!(result.results[0].success);
    assert!(!result.results[1].success);
    let error = result.error.as_deref().unwrap();
    assert!(error.starts_with("Step '"));
    assert!(error.contains("crunch the numbers"));

    // 中止的任务不持久化解法，但反思总是写入
    assert_eq!(memory.count(MemoryKind::Solution), 0);
    let reflections = memory.records(MemoryKind::Reflection);
    assert_eq!(reflections.len(), 1);
    assert!(reflections[0].content.contains("(1/3 steps)"));
    assert!(reflections[0].content.contains("1 step(s) not executed"));

    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_research_with_no_sources_fails_first_step() {
    let plan = r#"{
        "steps": [
            {"type": "search", "description": "gather current price information"},
            {"type": "code_execution", "description": "summarize findings"}
        ]
    }"#;
    // search 步骤没有任何 URL 可抓取 -> provider 报错 -> 步骤失败、计划中止，
    // 第二步的合成调用不发生
    let (orchestrator, llm, memory) = build(vec![
        Ok(RESEARCH_UNDERSTANDING.to_string()),
        Ok(plan.to_string()),
    ]);

    let request = "research the current price of the item";
    let result = orchestrator
        .handle_request(
            request,
            &[],
            &[],
            Some(descriptor(TaskCategory::Research, request)),
            CancellationToken::new(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].step_type, StepType::Search);
    assert!(!result.results[0].success);
    assert_eq!(memory.count(MemoryKind::Solution), 0);
    assert_eq!(llm.remaining(), 0);
}

/// 永不返回的检索协作方：验证步骤级墙钟超时对非沙箱步骤同样生效
struct StalledSearcher;

#[async_trait::async_trait]
impl wasp::handlers::SearchProvider for StalledSearcher {
    async fn search(
        &self,
        _query: &str,
        _urls: &[String],
    ) -> Result<serde_json::Value, String> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(serde_json::json!({"sources": []}))
    }
}

#[tokio::test]
async fn test_step_timeout_bounds_every_handler_type() {
    let plan = r#"{
        "steps": [
            {"type": "search", "description": "poll https://docs.rs/tokio", "timeout_secs": 1},
            {"type": "code_execution", "description": "summarize findings"}
        ]
    }"#;
    let llm = Arc::new(ScriptedLlm::new(vec![
        Ok(RESEARCH_UNDERSTANDING.to_string()),
        Ok(plan.to_string()),
    ]));
    let memory = Arc::new(InMemorySemanticStore::new(100));
    let orchestrator = Orchestrator::new(&test_config(), llm.clone(), memory)
        .with_search_provider(Arc::new(StalledSearcher));

    let start = std::time::Instant::now();
    let request = "research the latest tokio docs";
    let result = orchestrator
        .handle_request(
            request,
            &[],
            &[],
            Some(descriptor(TaskCategory::Research, request)),
            CancellationToken::new(),
        )
        .await;

    // 1s 步骤超时必须远早于协作方的 3600s 停滞返回
    assert!(start.elapsed() < std::time::Duration::from_secs(10));
    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    assert!(result.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_planning_garbage_falls_back_to_single_code_step() {
    let (orchestrator, _, _memory) = build(vec![
        Ok(CREATION_UNDERSTANDING.to_string()),
        Ok("hmm, let me think about the best approach...".to_string()),
        Ok(fenced(r#"printf '{"success": true}'"#)),
    ]);

    let request = "create a short note about bees";
    let result = orchestrator
        .handle_request(
            request,
            &[],
            &[],
            Some(descriptor(TaskCategory::DocumentCreation, request)),
            CancellationToken::new(),
        )
        .await;

    // 回退计划：恰好一个 code_execution，描述即原始请求
    assert!(result.success);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].step_type, StepType::CodeExecution);
    assert_eq!(result.results[0].description, request);
}

#[tokio::test]
async fn test_cancellation_fails_current_step() {
    let (orchestrator, _, memory) = build(vec![
        Ok(CREATION_UNDERSTANDING.to_string()),
        Ok(SINGLE_CODE_PLAN.to_string()),
        // 合成响应可能在取消竞争前被消费，仍需提供
        Ok(fenced("sleep 30")),
    ]);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = "create a document about photosynthesis";
    let result = orchestrator
        .handle_request(
            request,
            &[],
            &[],
            Some(descriptor(TaskCategory::DocumentCreation, request)),
            cancel,
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    assert!(!result.results[0].success);
    assert!(result.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("cancelled"));
    assert_eq!(memory.count(MemoryKind::Solution), 0);
    // 反思仍然写入
    assert_eq!(memory.count(MemoryKind::Reflection), 1);
}

#[tokio::test]
async fn test_past_solution_available_for_next_planning() {
    // 第一轮全部成功写入解法；同一编排器上按相同主题检索应命中
    let script = fenced(r#"printf '{"success": true}'"#);
    let (orchestrator, _, memory) = build(vec![
        Ok(CREATION_UNDERSTANDING.to_string()),
        Ok(SINGLE_CODE_PLAN.to_string()),
        Ok(script),
    ]);

    let request = "create a one-page document about photosynthesis";
    let result = orchestrator
        .handle_request(
            request,
            &[],
            &[],
            Some(descriptor(TaskCategory::DocumentCreation, request)),
            CancellationToken::new(),
        )
        .await;
    assert!(result.success);

    let hits = memory.search("photosynthesis document", MemoryKind::Solution, 3);
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("generate the photosynthesis document"));
}
