//! 代码合成器：按步骤目标生成可执行代码
//!
//! 检索少量历史成功解法作为 few-shot 上下文（为空不算错误）；要求生成代码自行处理
//! 错误并向 stdout 打印唯一的结构化 JSON 结果，文件读取一律相对沙箱工作目录。
//! 静态语法校验失败时恰好做一次自动修复并无条件接受其输出（不再重试）；
//! 从 import 语句尽力提取依赖列表；按简单线索估计运行时长档位（调度提示用）。

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::memory::{MemoryKind, SemanticMemory};
use crate::sandbox::SUPPORTED_LANGUAGE;
use crate::task::UploadedFile;

/// 运行时长档位（仅作调度提示）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeClass {
    Fast,
    Medium,
    Slow,
}

/// 一个代码步骤生命周期内的生成代码
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub source: String,
    pub language: String,
    pub dependencies: Vec<String>,
    pub runtime: RuntimeClass,
}

const SYNTH_SYSTEM: &str = r#"You write a single self-contained Python script for one task step.
Hard requirements:
- Handle your own errors: the script must never raise an uncaught exception.
- Print EXACTLY ONE JSON object to stdout as the final output, e.g.
  {"success": true, "summary": "...", "generated_files": ["report.docx"]}
  with "success": false and an "error" field when something went wrong.
- Read and write all files relative to the current working directory.
- No interactive input, no infinite loops.
Respond with ONE fenced code block: ```python ... ```"#;

const REPAIR_SYSTEM: &str = r#"The following Python script has a syntax problem. Return a corrected
version of the complete script in ONE fenced code block: ```python ... ```. Change as little as possible."#;

/// 代码合成器：LLM 生成 + 一次修复 + 依赖与时长估计
pub struct CodeSynthesizer {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn SemanticMemory>,
    opts: CompletionOptions,
    /// few-shot 检索条数
    retrieve_k: usize,
}

impl CodeSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<dyn SemanticMemory>,
        opts: CompletionOptions,
        retrieve_k: usize,
    ) -> Self {
        Self {
            llm,
            memory,
            opts,
            retrieve_k,
        }
    }

    pub async fn synthesize(
        &self,
        description: &str,
        context: &BTreeMap<String, Value>,
        files: &[UploadedFile],
    ) -> Result<GeneratedCode, String> {
        // 历史解法检索：尽力而为，空结果不是错误
        let examples = self
            .memory
            .search(description, MemoryKind::Solution, self.retrieve_k);

        let mut user = format!("Step goal: {}", description);
        if let Some(understanding) = context.get("understanding") {
            user.push_str(&format!(
                "\n\nTask understanding:\n{}",
                serde_json::to_string_pretty(understanding).unwrap_or_default()
            ));
        }
        if let Some(previous) = context.get("previous_results") {
            user.push_str(&format!(
                "\n\nOutputs of earlier steps (available as context, not as files):\n{}",
                serde_json::to_string_pretty(previous).unwrap_or_default()
            ));
        }
        if !files.is_empty() {
            let names: Vec<String> = files
                .iter()
                .map(|f| format!("{} ({})", f.name, f.media_type))
                .collect();
            user.push_str(&format!(
                "\n\nInput files in the working directory: {}",
                names.join(", ")
            ));
        }
        if !examples.is_empty() {
            user.push_str("\n\nSolutions that worked for similar requests:");
            for ex in &examples {
                user.push_str(&format!("\n- {}", ex.content));
            }
        }

        let messages = [Message::system(SYNTH_SYSTEM), Message::user(user)];
        let output = self.llm.complete(&messages, &self.opts).await?;
        let mut source = extract_code_block(&output);

        if let Err(reason) = validate_syntax(&source) {
            tracing::warn!(reason = %reason, "generated code failed validation, one repair attempt");
            source = self.repair(&source, &reason).await.unwrap_or(source);
        }

        let dependencies = extract_dependencies(&source);
        let runtime = classify_runtime(&source, &dependencies);
        tracing::debug!(deps = ?dependencies, runtime = ?runtime, "code synthesized");

        Ok(GeneratedCode {
            source,
            language: SUPPORTED_LANGUAGE.to_string(),
            dependencies,
            runtime,
        })
    }

    /// 唯一一次修复：输出无条件接受，后续失败交给沙箱执行去暴露
    async fn repair(&self, source: &str, reason: &str) -> Result<String, String> {
        let user = format!("Problem: {}\n\nScript:\n```python\n{}\n```", reason, source);
        let messages = [Message::system(REPAIR_SYSTEM), Message::user(user)];
        let output = self.llm.complete(&messages, &self.opts).await?;
        Ok(extract_code_block(&output))
    }
}

/// 从 LLM 输出提取代码块（```python ... ``` / ``` ... ``` / 原文）
pub fn extract_code_block(output: &str) -> String {
    let trimmed = output.trim();
    for fence in ["```python", "```py", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let rest = &trimmed[start + fence.len()..];
            let body = rest
                .find("```")
                .map(|end| &rest[..end])
                .unwrap_or(rest);
            return body.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// 静态语法校验（尽力而为）：非空、无残留围栏、括号在字符串字面量之外保持配对。
/// 三引号字符串整段跳过；单引号字符串遇换行停止跟踪，避免误报
pub fn validate_syntax(source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("Empty code".to_string());
    }
    if source.contains("```") {
        return Err("Markdown fence residue in code".to_string());
    }

    let chars: Vec<char> = source.chars().collect();
    let mut stack: Vec<char> = Vec::new();
    // (引号字符, 是否三引号)
    let mut string: Option<(char, bool)> = None;
    let mut in_comment = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            i += 1;
            continue;
        }
        if let Some((quote, triple)) = string {
            if c == '\\' {
                i += 2;
                continue;
            }
            if triple {
                if c == quote
                    && chars.get(i + 1) == Some(&quote)
                    && chars.get(i + 2) == Some(&quote)
                {
                    string = None;
                    i += 3;
                    continue;
                }
            } else if c == quote || c == '\n' {
                string = None;
            }
            i += 1;
            continue;
        }
        match c {
            '#' => in_comment = true,
            '\'' | '"' => {
                if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    string = Some((c, true));
                    i += 3;
                    continue;
                }
                string = Some((c, false));
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(format!("Unbalanced '{}'", c));
                }
            }
            _ => {}
        }
        i += 1;
    }
    if let Some(open) = stack.last() {
        return Err(format!("Unclosed '{}'", open));
    }
    Ok(())
}

/// Python 标准库顶层模块（不计入依赖列表）
const STDLIB_MODULES: &[&str] = &[
    "os", "sys", "json", "math", "re", "datetime", "time", "random", "pathlib", "itertools",
    "collections", "typing", "io", "csv", "string", "functools", "subprocess", "shutil", "glob",
    "urllib", "http", "socket", "base64", "hashlib", "textwrap", "traceback", "dataclasses",
    "enum", "argparse", "tempfile", "uuid", "statistics", "zipfile",
];

/// 从 import 语句尽力提取第三方依赖（顶层模块名，去重保序）
pub fn extract_dependencies(source: &str) -> Vec<String> {
    let re = Regex::new(r"(?m)^\s*(?:from|import)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    let mut deps = Vec::new();
    for cap in re.captures_iter(source) {
        let module = cap[1].to_string();
        if STDLIB_MODULES.contains(&module.as_str()) {
            continue;
        }
        if !deps.contains(&module) {
            deps.push(module);
        }
    }
    deps
}

/// 网络调用类库 ≈ slow
const NETWORK_CUES: &[&str] = &["requests", "aiohttp", "httpx", "urllib", "socket", "selenium"];
/// 批量数据类库 ≈ medium
const BULK_DATA_CUES: &[&str] = &["pandas", "numpy", "matplotlib", "openpyxl", "scipy", "docx", "pptx"];

/// 运行时长估计：网络 ≈ slow，批量数据 ≈ medium，其余 fast
pub fn classify_runtime(source: &str, dependencies: &[String]) -> RuntimeClass {
    let has = |cues: &[&str]| {
        cues.iter().any(|cue| {
            dependencies.iter().any(|d| d == cue) || source.contains(&format!("import {}", cue))
        })
    };
    if has(NETWORK_CUES) {
        RuntimeClass::Slow
    } else if has(BULK_DATA_CUES) {
        RuntimeClass::Medium
    } else {
        RuntimeClass::Fast
    }
}
