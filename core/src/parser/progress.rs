//! Progress inference for live UI. Stages are informational and never feed
//! back into control flow.

use serde_json::Value;

use super::flavor::{field_str, BackendFlavor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Started,
    Analyzing,
    Executing,
    Completed,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ProgressStage,
    /// Tool name when the backend reports one alongside a tool invocation.
    pub tool: Option<String>,
}

impl ProgressUpdate {
    fn stage(stage: ProgressStage) -> Self {
        Self { stage, tool: None }
    }
}

/// Infer a progress stage from one event under a known flavor.
pub fn infer(event: &Value, flavor: BackendFlavor) -> Option<ProgressUpdate> {
    match flavor {
        BackendFlavor::Claude => match field_str(event, "subtype") {
            Some("tool_use") => Some(ProgressUpdate {
                stage: ProgressStage::Executing,
                tool: field_str(event, "tool_name")
                    .or_else(|| field_str(event, "name"))
                    .map(str::to_string),
            }),
            Some("tool_result") => Some(ProgressUpdate::stage(ProgressStage::Executing)),
            _ => None,
        },

        BackendFlavor::Opencode => {
            let state = event.get("part").and_then(|p| p.get("state"))?;
            let label = state
                .as_str()
                .or_else(|| state.get("status").and_then(Value::as_str))?;
            let stage = match label {
                "input" => ProgressStage::Analyzing,
                "running" => ProgressStage::Executing,
                "completed" | "error" => ProgressStage::Completed,
                _ => ProgressStage::Executing,
            };
            Some(ProgressUpdate::stage(stage))
        }

        BackendFlavor::Codex => {
            if field_str(event, "type") == Some("command_execution") {
                return Some(ProgressUpdate::stage(ProgressStage::Executing));
            }
            let item = event.get("item")?;
            if field_str(item, "type") == Some("message") {
                let thinking = field_str(item, "content")
                    .map(|c| c.starts_with("Thinking"))
                    .unwrap_or(false);
                if !thinking {
                    return Some(ProgressUpdate::stage(ProgressStage::Analyzing));
                }
            }
            None
        }

        BackendFlavor::Gemini => {
            let tool_use = field_str(event, "type") == Some("tool_use")
                || event
                    .get("tool_use")
                    .map(|v| truthy(v))
                    .unwrap_or(false);
            if tool_use {
                return Some(ProgressUpdate::stage(ProgressStage::Executing));
            }
            if field_str(event, "role") == Some("model") && event.get("delta").is_some() {
                return Some(ProgressUpdate::stage(ProgressStage::Analyzing));
            }
            None
        }

        BackendFlavor::Unknown => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
