//! Reasoner - Understanding：把原始请求深化为结构化理解记录
//!
//! 四种原型（creation / research / analysis / automation）决定 Planner 是否允许加入
//! 网络步骤。输出不可解析时回退为最小记录（output_format="other"、needs_internet=false）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::reason::extract_json_block;
use crate::task::{TaskDescriptor, UploadedFile};

/// 任务原型：决定规划时的网络 / 文件策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskArchetype {
    /// 用已有知识创作，不需要网络
    Creation,
    /// 需要联网获取信息
    Research,
    /// 操作附带的文件
    Analysis,
    /// 站点 / API 交互
    Automation,
}

impl Default for TaskArchetype {
    fn default() -> Self {
        TaskArchetype::Creation
    }
}

/// 理解记录：注入每个计划步骤的上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Understanding {
    pub intent: String,
    pub topic: String,
    #[serde(default)]
    pub archetype: TaskArchetype,
    pub output_format: String,
    #[serde(default)]
    pub output_filename: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub needs_internet: bool,
    #[serde(default = "default_complexity")]
    pub complexity: String,
}

fn default_complexity() -> String {
    "medium".to_string()
}

impl Understanding {
    /// 最小回退记录：LLM 输出不可解析时使用
    pub fn minimal(request: &str) -> Self {
        Self {
            intent: request.to_string(),
            topic: request.chars().take(80).collect(),
            archetype: TaskArchetype::Creation,
            output_format: "other".to_string(),
            output_filename: None,
            requirements: Vec::new(),
            approach: String::new(),
            needs_internet: false,
            complexity: default_complexity(),
        }
    }
}

const UNDERSTAND_SYSTEM: &str = r#"You deepen a user request into a structured understanding record.
Respond with ONE JSON object only:
{
  "intent": "<what the user actually wants>",
  "topic": "<short topic>",
  "archetype": "creation" | "research" | "analysis" | "automation",
  "output_format": "docx" | "pptx" | "xlsx" | "md" | "csv" | "json" | "other",
  "output_filename": "<specific filename or null>",
  "requirements": ["<requirement>", ...],
  "approach": "<one-sentence approach>",
  "needs_internet": true | false,
  "complexity": "low" | "medium" | "high"
}
Rules:
- "creation" means the deliverable can be produced from existing knowledge: needs_internet MUST be false.
- "research" means current external information is required: needs_internet MUST be true.
- "analysis" operates on the attached files. "automation" interacts with a site or API."#;

/// Understander：一次 LLM 调用产出 Understanding，失败时回退最小记录
pub struct Understander {
    llm: Arc<dyn LlmClient>,
    opts: CompletionOptions,
}

impl Understander {
    pub fn new(llm: Arc<dyn LlmClient>, opts: CompletionOptions) -> Self {
        Self { llm, opts }
    }

    pub async fn understand(
        &self,
        request: &str,
        files: &[UploadedFile],
        descriptor: &TaskDescriptor,
    ) -> Understanding {
        let mut user = format!(
            "Request: {}\nClassified category: {:?} (confidence {:.2})",
            request, descriptor.category, descriptor.confidence
        );
        if !files.is_empty() {
            let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
            user.push_str(&format!("\nAttached files: {}", names.join(", ")));
        }

        let messages = [Message::system(UNDERSTAND_SYSTEM), Message::user(user)];
        let output = match self.llm.complete(&messages, &self.opts).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "understanding LLM call failed, using minimal record");
                return Understanding::minimal(request);
            }
        };

        match extract_json_block(&output).and_then(|j| serde_json::from_str::<Understanding>(j).ok())
        {
            Some(u) => u,
            None => {
                tracing::warn!("understanding output unparseable, using minimal record");
                Understanding::minimal(request)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::task::{TaskCategory, TaskFlags};

    fn descriptor(category: TaskCategory) -> TaskDescriptor {
        TaskDescriptor {
            intent: "test".to_string(),
            category,
            confidence: 0.9,
            deliverable: Default::default(),
            flags: TaskFlags::default(),
        }
    }

    #[tokio::test]
    async fn test_parses_structured_record() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(r#"{
            "intent": "write a photosynthesis overview",
            "topic": "photosynthesis",
            "archetype": "creation",
            "output_format": "docx",
            "output_filename": "photosynthesis_overview.docx",
            "requirements": ["one page"],
            "approach": "generate document from existing knowledge",
            "needs_internet": false,
            "complexity": "low"
        }"#
        .to_string())]));
        let u = Understander::new(llm, CompletionOptions::default())
            .understand(
                "create a one-page document about photosynthesis",
                &[],
                &descriptor(TaskCategory::DocumentCreation),
            )
            .await;
        assert_eq!(u.archetype, TaskArchetype::Creation);
        assert!(!u.needs_internet);
        assert_eq!(u.output_filename.as_deref(), Some("photosynthesis_overview.docx"));
    }

    #[tokio::test]
    async fn test_fallback_on_garbage_output() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("sure, happy to help!".to_string())]));
        let u = Understander::new(llm, CompletionOptions::default())
            .understand("do the thing", &[], &descriptor(TaskCategory::Mixed))
            .await;
        assert_eq!(u.output_format, "other");
        assert!(!u.needs_internet);
        assert_eq!(u.archetype, TaskArchetype::Creation);
    }

    #[tokio::test]
    async fn test_fallback_on_llm_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err("boom".to_string())]));
        let u = Understander::new(llm, CompletionOptions::default())
            .understand("do the thing", &[], &descriptor(TaskCategory::Analysis))
            .await;
        assert_eq!(u.output_format, "other");
    }
}
