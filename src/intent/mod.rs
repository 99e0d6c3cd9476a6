//! 意图分类：请求入口门

pub mod classifier;

pub use classifier::{keyword_fallback, IntentClassifier};
