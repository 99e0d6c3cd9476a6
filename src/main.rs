//! Wasp - Rust 自主任务智能体
//!
//! 入口：初始化日志与配置，装配编排器，处理命令行给出的单个请求，
//! 将 TaskResult 以 JSON 打印到标准输出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use wasp::config::load_config;
use wasp::llm::create_llm_from_config;
use wasp::memory::InMemorySemanticStore;
use wasp::task::UploadedFile;
use wasp::Orchestrator;

fn usage() -> ! {
    eprintln!("Usage: wasp [--config <path>] [--file <path>]... <request...>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wasp::observability::init();

    // 参数解析：--config / --file 可重复，其余拼为请求文本
    let mut config_path: Option<PathBuf> = None;
    let mut file_paths: Vec<PathBuf> = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(args.next().unwrap_or_else(|| usage()))),
            "--file" => file_paths.push(PathBuf::from(args.next().unwrap_or_else(|| usage()))),
            _ => words.push(arg),
        }
    }
    if words.is_empty() {
        usage();
    }
    let request = words.join(" ");

    let cfg = load_config(config_path).context("Failed to load configuration")?;
    // 确保上传文件的工作目录存在
    if let Some(root) = &cfg.app.workspace_root {
        let _ = std::fs::create_dir_all(root);
    }
    let files = ingest_uploads(&file_paths)?;

    let llm = create_llm_from_config(&cfg);
    let memory = Arc::new(InMemorySemanticStore::new(cfg.memory.max_entries));
    let orchestrator = Orchestrator::new(&cfg, llm, memory);

    // Ctrl-C 触发任务级取消，当前步骤被终止并记为失败
    let cancel = CancellationToken::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling task");
            cancel_signal.cancel();
        }
    });

    let result = orchestrator
        .handle_request(&request, &files, &[], None, cancel)
        .await;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// 将命令行给出的文件路径包装为上传文件描述
fn ingest_uploads(paths: &[PathBuf]) -> anyhow::Result<Vec<UploadedFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Cannot read file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(UploadedFile {
            id: uuid::Uuid::new_v4().to_string(),
            media_type: media_type_for(&name),
            name,
            path: path.clone(),
            size: meta.len(),
        });
    }
    Ok(files)
}

fn media_type_for(name: &str) -> String {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "md" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}
