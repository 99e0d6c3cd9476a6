//! 文件摄取：FileProcessing 步骤的协作方接口
//!
//! process_file(path, request) 返回 {file_type, data, summary}。LocalFileIngestor
//! 做有界的本地读取（文本内容截断），按扩展名推断类型；真实部署可换成独立的解析服务。

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::sandbox::truncate_output;

/// 摄取结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInsight {
    pub file_type: String,
    pub data: serde_json::Value,
    pub summary: String,
}

/// 文件摄取 trait
#[async_trait]
pub trait FileIngestor: Send + Sync {
    async fn process_file(&self, path: &Path, request: &str) -> Result<FileInsight, String>;
}

/// 本地实现：有界文本读取 + 扩展名类型推断
pub struct LocalFileIngestor {
    /// 文本内容的最大字符数
    max_chars: usize,
}

impl LocalFileIngestor {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for LocalFileIngestor {
    fn default() -> Self {
        Self::new(8000)
    }
}

/// 扩展名到类型的粗分类
fn file_type_of(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "txt" | "md" => "text",
        "csv" | "tsv" => "tabular",
        "json" => "json",
        "png" | "jpg" | "jpeg" | "gif" | "webp" => "image",
        "pdf" => "pdf",
        "docx" | "doc" => "document",
        "xlsx" | "xls" => "spreadsheet",
        _ => "binary",
    }
}

#[async_trait]
impl FileIngestor for LocalFileIngestor {
    async fn process_file(&self, path: &Path, request: &str) -> Result<FileInsight, String> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| format!("Stat {}: {}", path.display(), e))?;
        let file_type = file_type_of(path);

        let data = match file_type {
            "text" | "tabular" | "json" => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| format!("Read {}: {}", path.display(), e))?;
                json!({ "content": truncate_output(&content, self.max_chars) })
            }
            // 二进制类只带元数据，内容留给生成代码在沙箱内处理
            _ => json!({ "size": meta.len() }),
        };

        let summary = format!(
            "{} ({} bytes, {}) for request: {}",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown"),
            meta.len(),
            file_type,
            truncate_output(request, 120),
        );

        Ok(FileInsight {
            file_type: file_type.to_string(),
            data,
            summary,
        })
    }
}
