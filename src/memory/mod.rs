//! 记忆层：语义记忆（解法 / 反思）与检索分词

pub mod semantic;
pub mod tokenizer;

pub use semantic::{InMemorySemanticStore, MemoryKind, MemoryRecord, NoopSemanticStore, SemanticMemory};
