//! 产物提取：扫描步骤输出，统一收集文件 / 图片引用
//!
//! 三个来源：(a) `generated_files` 数组标记（代码打印的结构化结果中列出新生成文件）、
//! (b) `file_path` 字段、(c) `image_url` 字段。顶层与嵌套的 `result` 对象都会被检查。

use serde_json::Value;

use crate::task::{Artifact, ArtifactKind, StepReport};

/// 从单个 JSON 对象收集产物引用
fn collect_from_object(obj: &Value, step_id: &str, out: &mut Vec<Artifact>) {
    if let Some(files) = obj.get("generated_files").and_then(Value::as_array) {
        for f in files {
            if let Some(path) = f.as_str() {
                out.push(Artifact {
                    kind: ArtifactKind::File,
                    location: path.to_string(),
                    step_id: step_id.to_string(),
                });
            }
        }
    }
    if let Some(path) = obj.get("file_path").and_then(Value::as_str) {
        out.push(Artifact {
            kind: ArtifactKind::File,
            location: path.to_string(),
            step_id: step_id.to_string(),
        });
    }
    if let Some(url) = obj.get("image_url").and_then(Value::as_str) {
        out.push(Artifact {
            kind: ArtifactKind::Image,
            location: url.to_string(),
            step_id: step_id.to_string(),
        });
    }
}

/// 扫描全部步骤报告，按出现顺序汇总产物列表
pub fn extract_artifacts(reports: &[StepReport]) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    for report in reports {
        collect_from_object(&report.output, &report.step_id, &mut artifacts);
        // 代码步骤把解析后的 stdout 结构化结果挂在 "result" 下
        if let Some(inner) = report.output.get("result") {
            collect_from_object(inner, &report.step_id, &mut artifacts);
        }
    }
    artifacts
}
