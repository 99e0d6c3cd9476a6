//! FileProcessing handler：摄取附带文件

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::files::FileIngestor;
use crate::handlers::{SharedContext, StepHandler};
use crate::task::ExecutionStep;

pub struct FileProcessingHandler {
    ingestor: std::sync::Arc<dyn FileIngestor>,
}

impl FileProcessingHandler {
    pub fn new(ingestor: std::sync::Arc<dyn FileIngestor>) -> Self {
        Self { ingestor }
    }
}

#[async_trait]
impl StepHandler for FileProcessingHandler {
    async fn execute(&self, step: &ExecutionStep, ctx: &SharedContext) -> Result<Value, String> {
        if ctx.files.is_empty() {
            return Err("No files attached to process".to_string());
        }
        let mut insights = Vec::new();
        for file in &ctx.files {
            let insight = self
                .ingestor
                .process_file(&file.path, &step.description)
                .await?;
            insights.push(json!({
                "file_id": file.id,
                "name": file.name,
                "file_type": insight.file_type,
                "data": insight.data,
                "summary": insight.summary,
            }));
        }
        Ok(json!({"files": insights}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::LocalFileIngestor;
    use crate::task::{StepType, TaskCategory, TaskDescriptor, TaskFlags, UploadedFile};

    fn ctx(files: Vec<UploadedFile>) -> SharedContext {
        SharedContext {
            request: "analyze my data".to_string(),
            descriptor: TaskDescriptor {
                intent: "analyze my data".to_string(),
                category: TaskCategory::Analysis,
                confidence: 0.9,
                deliverable: Default::default(),
                flags: TaskFlags::default(),
            },
            files,
        }
    }

    #[tokio::test]
    async fn test_no_files_is_error() {
        let handler = FileProcessingHandler::new(std::sync::Arc::new(LocalFileIngestor::default()));
        let step = ExecutionStep::new(StepType::FileProcessing, "ingest", 30);
        assert!(handler.execute(&step, &ctx(Vec::new())).await.is_err());
    }

    #[tokio::test]
    async fn test_ingests_attached_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let files = vec![UploadedFile {
            id: "f1".to_string(),
            name: "data.csv".to_string(),
            path,
            media_type: "text/csv".to_string(),
            size: 8,
        }];

        let handler = FileProcessingHandler::new(std::sync::Arc::new(LocalFileIngestor::default()));
        let step = ExecutionStep::new(StepType::FileProcessing, "ingest the csv", 30);
        let value = handler.execute(&step, &ctx(files)).await.unwrap();
        let listed = value["files"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["file_type"], "tabular");
    }
}
