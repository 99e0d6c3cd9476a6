//! 语义记忆：解法与反思记录的共享存储
//!
//! 支持 add(content, kind, tags, metadata) 与 search(query, kind, k)；对解法 / 反思
//! 记录只追加不修改，因此并发写入无需额外锁协调。当前实现为 InMemorySemanticStore
//! （分词重叠检索），后续可接 Qdrant/LanceDB 等真实向量库。

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::tokenizer;

/// 记录类别：成功解法 / 任务反思
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Solution,
    Reflection,
}

/// 一条语义记忆记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub content: String,
    pub kind: MemoryKind,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// 语义记忆 trait：追加写入与按类别的相似度检索
pub trait SemanticMemory: Send + Sync {
    /// 追加一条记录（写失败由实现内部处理，调用方视为尽力而为）
    fn add(&self, content: &str, kind: MemoryKind, tags: &[String], metadata: Value)
        -> Result<(), String>;

    /// 按查询检索指定类别下最相关的 k 条
    fn search(&self, query: &str, kind: MemoryKind, k: usize) -> Vec<MemoryRecord>;
}

/// 空实现：未启用语义记忆时使用
#[derive(Clone, Default)]
pub struct NoopSemanticStore;

impl SemanticMemory for NoopSemanticStore {
    fn add(
        &self,
        _content: &str,
        _kind: MemoryKind,
        _tags: &[String],
        _metadata: Value,
    ) -> Result<(), String> {
        Ok(())
    }

    fn search(&self, _query: &str, _kind: MemoryKind, _k: usize) -> Vec<MemoryRecord> {
        Vec::new()
    }
}

/// 内存实现：按分词重叠检索（无真实向量，适合 MVP 与测试）
#[derive(Clone)]
pub struct InMemorySemanticStore {
    /// (record, 分词集合) 追加存储
    store: Arc<RwLock<Vec<(MemoryRecord, HashSet<String>)>>>,
    max_entries: usize,
}

impl InMemorySemanticStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(Vec::new())),
            max_entries,
        }
    }

    /// 相似度：查询词与记录词的交集大小
    fn score(query_tokens: &HashSet<String>, doc_tokens: &HashSet<String>) -> usize {
        query_tokens.intersection(doc_tokens).count()
    }

    /// 指定类别下的记录数（测试与审计用）
    pub fn count(&self, kind: MemoryKind) -> usize {
        self.store
            .read()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.kind == kind)
            .count()
    }

    /// 指定类别下的全部记录快照（测试与审计用）
    pub fn records(&self, kind: MemoryKind) -> Vec<MemoryRecord> {
        self.store
            .read()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.kind == kind)
            .map(|(r, _)| r.clone())
            .collect()
    }
}

impl Default for InMemorySemanticStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl SemanticMemory for InMemorySemanticStore {
    fn add(
        &self,
        content: &str,
        kind: MemoryKind,
        tags: &[String],
        metadata: Value,
    ) -> Result<(), String> {
        let content = content.trim();
        if content.is_empty() {
            return Err("Empty content".to_string());
        }
        let mut tokens = tokenizer::tokenize_to_set(content);
        // 标签也参与检索
        for tag in tags {
            tokens.insert(tag.to_lowercase());
        }
        let record = MemoryRecord {
            content: content.to_string(),
            kind,
            tags: tags.to_vec(),
            metadata,
            created_at: Utc::now(),
        };
        let mut store = self.store.write().map_err(|e| e.to_string())?;
        store.push((record, tokens));
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
        Ok(())
    }

    fn search(&self, query: &str, kind: MemoryKind, k: usize) -> Vec<MemoryRecord> {
        let query_tokens = tokenizer::tokenize_to_set(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let store = self.store.read().unwrap();
        let mut scored: Vec<(usize, &MemoryRecord)> = store
            .iter()
            .filter(|(r, _)| r.kind == kind)
            .map(|(r, tokens)| (Self::score(&query_tokens, tokens), r))
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, r)| r.clone()).collect()
    }
}
