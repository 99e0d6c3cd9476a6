//! Reasoner 三角色：Understanding（理解）、Planner（规划）、Reflector（反思）

pub mod planner;
pub mod reflector;
pub mod understanding;

pub use planner::TaskPlanner;
pub use reflector::Reflector;
pub use understanding::{TaskArchetype, Understander, Understanding};

/// 从 LLM 输出中提取 JSON 块（```json ... ``` 或首个 { 与末个 } 之间）
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let inner = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
        return Some(inner);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        Some(&trimmed[start..=end])
    } else {
        None
    }
}
