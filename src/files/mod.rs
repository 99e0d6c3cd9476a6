//! 文件摄取协作方

pub mod ingest;

pub use ingest::{FileIngestor, FileInsight, LocalFileIngestor};
