//! 代码合成：生成、校验、一次修复、依赖与时长估计

pub mod synthesizer;

pub use synthesizer::{
    classify_runtime, extract_code_block, extract_dependencies, validate_syntax, CodeSynthesizer,
    GeneratedCode, RuntimeClass,
};
