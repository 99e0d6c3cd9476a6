//! Reasoner - Reflector：把步骤结局汇总为持久的反思日志
//!
//! 计算成功率 = 成功步数 ÷ 计划总步数，将每一步的结局（失败时含捕获的错误）写入
//! 语义记忆（kind=Reflection），打上类别标签供后续检索。写入失败仅记日志，不致命。

use std::sync::Arc;

use serde_json::json;

use crate::memory::{MemoryKind, SemanticMemory};
use crate::task::{ExecutionPlan, StepReport, TaskDescriptor};

/// Reflector：无 LLM 依赖，纯记忆写入
pub struct Reflector {
    memory: Arc<dyn SemanticMemory>,
}

impl Reflector {
    pub fn new(memory: Arc<dyn SemanticMemory>) -> Self {
        Self { memory }
    }

    /// 汇总并写入反思日志；返回成功率供调用方记日志
    pub fn reflect(
        &self,
        descriptor: &TaskDescriptor,
        plan: &ExecutionPlan,
        reports: &[StepReport],
    ) -> f32 {
        let total = plan.steps.len().max(1);
        let succeeded = reports.iter().filter(|r| r.success).count();
        let ratio = succeeded as f32 / total as f32;

        let mut journal = format!(
            "Task: {}\nSuccess ratio: {:.2} ({}/{} steps)\n",
            plan.request, ratio, succeeded, total
        );
        for report in reports {
            match &report.error {
                Some(e) => journal.push_str(&format!(
                    "- [failed] {:?}: {} — error: {}\n",
                    report.step_type, report.description, e
                )),
                None => journal.push_str(&format!(
                    "- [ok] {:?}: {}\n",
                    report.step_type, report.description
                )),
            }
        }
        if reports.len() < plan.steps.len() {
            journal.push_str(&format!(
                "- {} step(s) not executed (plan halted)\n",
                plan.steps.len() - reports.len()
            ));
        }

        let category = serde_json::to_value(descriptor.category)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "unknown".to_string());
        let tags = vec![category, "task_reflection".to_string()];
        let metadata = json!({
            "plan_id": plan.id,
            "success_ratio": ratio,
            "steps_total": total,
            "steps_executed": reports.len(),
        });

        if let Err(e) = self
            .memory
            .add(&journal, MemoryKind::Reflection, &tags, metadata)
        {
            tracing::warn!(error = %e, "reflection write failed (non-fatal)");
        }

        ratio
    }
}
