//! 意图分类器：管线入口门
//!
//! 判定请求是否可执行、属于哪个类别、需要整条管线还是直接对话回复。
//! LLM 输出畸形时回退关键词启发式：祈使动词（create/generate/analyze/research 等）
//! 以固定置信度 0.7 标为任务，其余按纯对话处理。纯函数，不写任何记忆。

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::reason::extract_json_block;
use crate::task::{DeliverableSpec, TaskCategory, TaskDescriptor, TaskFlags, UploadedFile};

/// 启发式回退的固定置信度
const FALLBACK_CONFIDENCE: f32 = 0.7;

const CLASSIFY_SYSTEM: &str = r#"You are the entry gate of a task pipeline. Classify the user request.
Respond with ONE JSON object only:
{
  "category": "conversation" | "document_creation" | "presentation_creation" | "spreadsheet_creation" | "analysis" | "research" | "automation" | "code_generation" | "file_processing" | "mixed",
  "confidence": <0.0-1.0>,
  "filename": "<specific topic-derived filename for creation categories, or null>",
  "format": "<docx|pptx|xlsx|md|csv|other or null>",
  "outline": ["<section>", ...],
  "style": "<style hint or null>",
  "needs_network": true | false,
  "needs_files": true | false
}
Rules:
- "conversation" is for greetings, opinions, questions answerable directly in chat.
- For creation categories the filename must be derived from the topic, never a placeholder like "document.docx"."#;

/// LLM 分类输出
#[derive(Debug, Deserialize)]
struct RawClassification {
    category: TaskCategory,
    confidence: Option<f32>,
    filename: Option<String>,
    format: Option<String>,
    #[serde(default)]
    outline: Vec<String>,
    style: Option<String>,
    #[serde(default)]
    needs_network: bool,
    #[serde(default)]
    needs_files: bool,
}

/// 意图分类器：一次 LLM 调用 + 关键词回退
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    opts: CompletionOptions,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, opts: CompletionOptions) -> Self {
        Self { llm, opts }
    }

    pub async fn classify(
        &self,
        utterance: &str,
        recent_history: &[Message],
        files: &[UploadedFile],
    ) -> TaskDescriptor {
        let mut user = format!("Request: {}", utterance);
        if !recent_history.is_empty() {
            let tail: Vec<String> = recent_history
                .iter()
                .rev()
                .take(4)
                .rev()
                .map(|m| format!("{:?}: {}", m.role, m.content))
                .collect();
            user.push_str(&format!("\nRecent conversation:\n{}", tail.join("\n")));
        }
        if !files.is_empty() {
            let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
            user.push_str(&format!("\nAttached files: {}", names.join(", ")));
        }

        let messages = [Message::system(CLASSIFY_SYSTEM), Message::user(user)];
        let raw = match self.llm.complete(&messages, &self.opts).await {
            Ok(output) => extract_json_block(&output)
                .and_then(|j| serde_json::from_str::<RawClassification>(j).ok()),
            Err(e) => {
                tracing::warn!(error = %e, "classification LLM call failed");
                None
            }
        };

        match raw {
            Some(raw) => self.from_raw(utterance, files, raw),
            None => {
                tracing::warn!("classification output malformed, using keyword heuristic");
                keyword_fallback(utterance, files)
            }
        }
    }

    fn from_raw(
        &self,
        utterance: &str,
        files: &[UploadedFile],
        raw: RawClassification,
    ) -> TaskDescriptor {
        let category = raw.category;
        let confidence = raw.confidence.unwrap_or(FALLBACK_CONFIDENCE).clamp(0.0, 1.0);
        let format = raw.format.or_else(|| default_format(category));
        // 创建类必须有具体文件名；LLM 给了占位名时重新派生
        let filename = match raw.filename {
            Some(name) if !is_placeholder_filename(&name) => Some(name),
            _ if category.is_creation() => Some(derive_filename(utterance, format.as_deref())),
            other => other,
        };

        TaskDescriptor {
            intent: utterance.to_string(),
            category,
            confidence,
            deliverable: DeliverableSpec {
                filename,
                format,
                outline: raw.outline,
                style: raw.style,
            },
            flags: TaskFlags {
                needs_network: raw.needs_network,
                needs_files: raw.needs_files || !files.is_empty(),
                needs_background: category != TaskCategory::Conversation,
            },
        }
    }
}

/// 祈使动词表：出现即标为任务
const TASK_VERBS: &[&str] = &[
    "create", "generate", "write", "make", "build", "produce", "analyze", "analyse", "research",
    "scrape", "summarize", "convert", "extract",
];

/// 关键词启发式：LLM 不可用或输出畸形时的本地回退
pub fn keyword_fallback(utterance: &str, files: &[UploadedFile]) -> TaskDescriptor {
    let lower = utterance.to_lowercase();
    let is_task = TASK_VERBS.iter().any(|v| lower.contains(v));

    let category = if !is_task {
        TaskCategory::Conversation
    } else if lower.contains("presentation") || lower.contains("slides") || lower.contains("pptx") {
        TaskCategory::PresentationCreation
    } else if lower.contains("spreadsheet") || lower.contains("xlsx") || lower.contains("excel") {
        TaskCategory::SpreadsheetCreation
    } else if lower.contains("document") || lower.contains("report") || lower.contains("docx") {
        TaskCategory::DocumentCreation
    } else if lower.contains("research") || lower.contains("online") || lower.contains("price") {
        TaskCategory::Research
    } else if lower.contains("analyze") || lower.contains("analyse") {
        TaskCategory::Analysis
    } else if lower.contains("scrape") || lower.contains("website") {
        TaskCategory::Automation
    } else if lower.contains("code") || lower.contains("script") {
        TaskCategory::CodeGeneration
    } else if !files.is_empty() {
        TaskCategory::FileProcessing
    } else {
        TaskCategory::Mixed
    };

    let format = default_format(category);
    let filename = if category.is_creation() {
        Some(derive_filename(utterance, format.as_deref()))
    } else {
        None
    };
    let confidence = if category == TaskCategory::Conversation {
        1.0 - FALLBACK_CONFIDENCE
    } else {
        FALLBACK_CONFIDENCE
    };

    TaskDescriptor {
        intent: utterance.to_string(),
        category,
        confidence,
        deliverable: DeliverableSpec {
            filename,
            format,
            outline: Vec::new(),
            style: None,
        },
        flags: TaskFlags {
            needs_network: category == TaskCategory::Research,
            needs_files: !files.is_empty(),
            needs_background: category != TaskCategory::Conversation,
        },
    }
}

fn default_format(category: TaskCategory) -> Option<String> {
    match category {
        TaskCategory::DocumentCreation => Some("docx".to_string()),
        TaskCategory::PresentationCreation => Some("pptx".to_string()),
        TaskCategory::SpreadsheetCreation => Some("xlsx".to_string()),
        _ => None,
    }
}

/// 占位名检测：document.docx / file.pptx / output.xlsx 之类
fn is_placeholder_filename(name: &str) -> bool {
    let stem = name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(name)
        .to_lowercase();
    matches!(
        stem.as_str(),
        "document" | "file" | "output" | "untitled" | "presentation" | "spreadsheet" | "result"
    )
}

/// 从请求文本派生具体文件名：去掉祈使动词与停用词后的前几个词 slug 化
fn derive_filename(utterance: &str, format: Option<&str>) -> String {
    const STOPWORDS: &[&str] = &[
        "a", "an", "the", "about", "on", "of", "for", "me", "my", "please", "to", "with", "and",
        "in", "page", "one-page",
    ];
    let words: Vec<String> = utterance
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .filter(|w| !TASK_VERBS.contains(&w.as_str()))
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .take(4)
        .collect();

    let stem = if words.is_empty() {
        "deliverable".to_string()
    } else {
        words.join("_")
    };
    format!("{}.{}", stem, format.unwrap_or("docx"))
}
