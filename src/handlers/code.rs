//! CodeExecution handler：合成代码并交给沙箱执行
//!
//! 结果 Value 带显式 success 字段（即沙箱报告的执行标志），stdout 中的结构化
//! JSON 结果解析后挂在 "result" 下，供产物提取与后续步骤上下文使用。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::handlers::{SharedContext, StepHandler};
use crate::reason::extract_json_block;
use crate::sandbox::SandboxEngine;
use crate::synth::CodeSynthesizer;
use crate::task::ExecutionStep;

pub struct CodeExecutionHandler {
    synthesizer: CodeSynthesizer,
    sandbox: SandboxEngine,
}

impl CodeExecutionHandler {
    pub fn new(synthesizer: CodeSynthesizer, sandbox: SandboxEngine) -> Self {
        Self {
            synthesizer,
            sandbox,
        }
    }
}

/// stdout 中打印的唯一 JSON 结果对象（生成代码的约定输出）
fn parse_structured_stdout(stdout: &str) -> Option<Value> {
    let json_str = extract_json_block(stdout)?;
    serde_json::from_str::<Value>(json_str)
        .ok()
        .filter(Value::is_object)
}

#[async_trait]
impl StepHandler for CodeExecutionHandler {
    async fn execute(&self, step: &ExecutionStep, ctx: &SharedContext) -> Result<Value, String> {
        let code = self
            .synthesizer
            .synthesize(&step.description, &step.context, &ctx.files)
            .await?;

        let exec = self
            .sandbox
            .execute(&code.source, &code.language, step.timeout_secs, &ctx.files)
            .await;

        let mut value = json!({
            "success": exec.success,
            "stdout": exec.stdout,
            "stderr": exec.stderr,
            "exit_code": exec.exit_code,
            "duration_ms": exec.duration_ms,
            "dependencies": code.dependencies,
            "runtime": code.runtime,
        });
        if let Some(error) = &exec.error {
            value["error"] = json!(error);
        }
        if let Some(result) = parse_structured_stdout(&exec.stdout) {
            value["result"] = result;
        }
        Ok(value)
    }
}
