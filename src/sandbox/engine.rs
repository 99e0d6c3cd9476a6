//! 沙箱执行引擎：在临时目录内运行一段生成代码
//!
//! 每次调用创建一个自动销毁的临时工作目录：代码落盘为 main.py，输入文件复制到同目录，
//! 并以该目录为进程 CWD。硬超时到期强制终止进程（kill_on_drop，由运行时回收），
//! 报告为 success=false 的超时结果而非异常。stdout/stderr 各自按字符数截断并追加标记。
//!
//! 基础设计仅提供目录级隔离，不保证网络 / 文件系统沙箱——生产部署需由外层容器 / VM
//! 边界兜底（已在文档中声明的限制）。

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use crate::task::UploadedFile;

/// 基础层唯一接受的语言
pub const SUPPORTED_LANGUAGE: &str = "python";

/// 截断标记（与 Search 结果截断一致）
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// 沙箱配置：解释器与输出上限
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// 解释器二进制；测试中可指向 sh 等以保持用例自洽
    pub python_bin: String,
    /// stdout / stderr 各自的最大字符数
    pub max_output_chars: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            max_output_chars: 10_000,
        }
    }
}

/// 一次沙箱执行的不可变输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// 唯一判定来源：进程退出状态，与打印内容无关
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

/// 超过上限时截断到恰好 max 个字符并追加标记
pub fn truncate_output(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect::<String>() + TRUNCATION_MARKER
    } else {
        s.to_string()
    }
}

/// 沙箱执行引擎
pub struct SandboxEngine {
    config: SandboxConfig,
}

impl SandboxEngine {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// 执行一段代码；任何内部失败（含超时）都转为失败的 ExecutionResult，不向上抛出
    pub async fn execute(
        &self,
        code: &str,
        language: &str,
        timeout_secs: u64,
        input_files: &[UploadedFile],
    ) -> ExecutionResult {
        // 语言门禁：非 python 立即确定性失败，不尝试运行
        if language != SUPPORTED_LANGUAGE {
            return ExecutionResult::failed(format!("Unsupported language: {}", language), 0);
        }

        let start = Instant::now();
        match self.run_in_tempdir(code, timeout_secs, input_files).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::failed(e, start.elapsed().as_millis() as u64),
        }
    }

    async fn run_in_tempdir(
        &self,
        code: &str,
        timeout_secs: u64,
        input_files: &[UploadedFile],
    ) -> Result<ExecutionResult, String> {
        let dir = tempfile::tempdir().map_err(|e| format!("Create sandbox dir: {}", e))?;
        let script = dir.path().join("main.py");
        tokio::fs::write(&script, code)
            .await
            .map_err(|e| format!("Write code: {}", e))?;
        self.copy_inputs(dir.path(), input_files).await;

        tracing::info!(
            dir = %dir.path().display(),
            timeout_secs,
            files = input_files.len(),
            "sandbox execute"
        );

        let start = Instant::now();
        let child = Command::new(&self.config.python_bin)
            .arg("main.py")
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Spawn {}: {}", self.config.python_bin, e))?;

        // 超时分支丢弃 future 即丢弃 child，kill_on_drop 保证进程被终止并由运行时回收
        let output = match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("Wait for process: {}", e)),
            Err(_) => {
                tracing::warn!(timeout_secs, "sandbox timeout, process killed");
                return Ok(ExecutionResult {
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: Some(format!("Execution timed out after {}s", timeout_secs)),
                });
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = truncate_output(
            &String::from_utf8_lossy(&output.stdout),
            self.config.max_output_chars,
        );
        let stderr = truncate_output(
            &String::from_utf8_lossy(&output.stderr),
            self.config.max_output_chars,
        );
        let success = output.status.success();

        Ok(ExecutionResult {
            success,
            stdout,
            stderr: stderr.clone(),
            exit_code: output.status.code(),
            duration_ms,
            error: if success {
                None
            } else {
                Some(format!(
                    "Exited with {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ))
            },
        })
    }

    /// 输入文件复制为同名文件，便于生成代码以相对路径读取；单个失败只记日志
    async fn copy_inputs(&self, dir: &Path, input_files: &[UploadedFile]) {
        for file in input_files {
            let dest = dir.join(&file.name);
            if let Err(e) = tokio::fs::copy(&file.path, &dest).await {
                tracing::warn!(file = %file.name, error = %e, "copy input file failed");
            }
        }
    }
}
