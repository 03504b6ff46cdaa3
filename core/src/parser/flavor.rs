use serde_json::Value;

/// Which backend a stream is coming from, inferred from event shape.
///
/// The four protocols overlap and drift, so classification is best-effort
/// structural matching rather than a rigid schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFlavor {
    Codex,
    Claude,
    Gemini,
    Opencode,
    #[default]
    Unknown,
}

impl std::fmt::Display for BackendFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendFlavor::Codex => "codex",
            BackendFlavor::Claude => "claude",
            BackendFlavor::Gemini => "gemini",
            BackendFlavor::Opencode => "opencode",
            BackendFlavor::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl BackendFlavor {
    /// Classify a decoded event. Rules are ordered; the first match wins.
    pub fn classify(event: &Value) -> Self {
        if event.get("thread_id").is_some()
            || event.get("item").and_then(|i| i.get("type")).is_some()
        {
            return BackendFlavor::Codex;
        }

        if event.get("subtype").is_some()
            || event.get("result").is_some()
            || (field_str(event, "type") == Some("result") && event.get("session_id").is_some())
        {
            return BackendFlavor::Claude;
        }

        if event.get("role").is_some()
            || event.get("delta").is_some()
            || (field_str(event, "type") == Some("init") && event.get("session_id").is_some())
        {
            return BackendFlavor::Gemini;
        }

        if event.get("sessionID").is_some() && event.get("part").is_some() {
            return BackendFlavor::Opencode;
        }

        BackendFlavor::Unknown
    }
}

pub(crate) fn field_str<'a>(event: &'a Value, key: &str) -> Option<&'a str> {
    event.get(key).and_then(Value::as_str)
}
