//! Per-flavor accessors over decoded events. Extraction is best-effort and
//! always string-valued; anything that is not a string is ignored.

use serde_json::Value;

use super::flavor::{field_str, BackendFlavor};

/// Extract the user-facing message fragment from one event.
pub fn message(event: &Value, flavor: BackendFlavor) -> Option<String> {
    match flavor {
        BackendFlavor::Codex => event.get("item").and_then(codex_item_message),
        BackendFlavor::Claude => claude_message(event),
        BackendFlavor::Gemini => gemini_message(event),
        BackendFlavor::Opencode => event.get("part").and_then(opencode_part_message),
        BackendFlavor::Unknown => field_str(event, "content")
            .or_else(|| field_str(event, "text"))
            .or_else(|| field_str(event, "message"))
            .map(str::to_string),
    }
}

fn codex_item_message(item: &Value) -> Option<String> {
    // Some codex builds serialize the item itself as a JSON string.
    if let Some(raw) = item.as_str() {
        let decoded: Value = serde_json::from_str(raw).ok()?;
        return codex_item_message(&decoded);
    }

    if field_str(item, "type") == Some("command_execution") {
        if let Some(out) = field_str(item, "aggregated_output") {
            return Some(out.to_string());
        }
    }

    field_str(item, "content")
        .or_else(|| field_str(item, "text"))
        .map(str::to_string)
}

fn claude_message(event: &Value) -> Option<String> {
    field_str(event, "result")
        .or_else(|| field_str(event, "content"))
        .or_else(|| {
            event
                .get("tool_use_result")
                .and_then(|r| r.get("stdout"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

fn gemini_message(event: &Value) -> Option<String> {
    if field_str(event, "type") == Some("tool_result") {
        if let Some(out) = field_str(event, "output") {
            return Some(out.to_string());
        }
    }
    field_str(event, "content").map(str::to_string)
}

fn opencode_part_message(part: &Value) -> Option<String> {
    if let Some(raw) = part.as_str() {
        let decoded: Value = serde_json::from_str(raw).ok()?;
        return opencode_part_message(&decoded);
    }

    if field_str(part, "type") == Some("tool") {
        if let Some(out) = part
            .get("state")
            .and_then(|s| s.get("output"))
            .and_then(Value::as_str)
        {
            return Some(out.to_string());
        }
    }

    field_str(part, "text")
        .or_else(|| field_str(part, "content"))
        .map(str::to_string)
}

/// Extract the backend-assigned correlation id from one event.
pub fn session_id(event: &Value, flavor: BackendFlavor) -> Option<String> {
    let primary = match flavor {
        BackendFlavor::Codex => field_str(event, "thread_id"),
        BackendFlavor::Claude | BackendFlavor::Gemini => field_str(event, "session_id"),
        BackendFlavor::Opencode => field_str(event, "sessionID"),
        BackendFlavor::Unknown => None,
    };

    primary
        .or_else(|| field_str(event, "session_id"))
        .or_else(|| field_str(event, "sessionId"))
        .or_else(|| field_str(event, "thread_id"))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Whether this event marks the end of the backend's turn. Informational:
/// parsing always continues to EOF.
pub fn is_completion(event: &Value, flavor: BackendFlavor) -> bool {
    let ty = field_str(event, "type");
    match flavor {
        BackendFlavor::Codex => matches!(ty, Some("completed") | Some("done")),
        BackendFlavor::Claude => {
            ty == Some("result") || field_str(event, "subtype") == Some("success")
        }
        BackendFlavor::Gemini => {
            field_str(event, "status") == Some("completed") || ty == Some("done")
        }
        BackendFlavor::Opencode => matches!(ty, Some("done") | Some("completed")),
        BackendFlavor::Unknown => false,
    }
}
