//! Child environment construction for `--minimal-env` runs.

use std::collections::HashMap;

/// Names forwarded verbatim (their lowercase spellings are accepted too).
const ALLOWED_NAMES: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "TERM",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "AZURE_OPENAI_API_KEY",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "NODE_PATH",
    "PYTHONPATH",
    "GEM_PATH",
    "GOPATH",
    "DISPLAY",
    "COLORTERM",
    "TERM_PROGRAM",
    "SSH_AUTH_SOCK",
    "GPG_AGENT_INFO",
];

/// Prefix families forwarded wholesale (backend- and wrapper-specific).
const ALLOWED_PREFIXES: &[&str] = &[
    "CODEX_",
    "CODEAGENT_",
    "OPENAI_",
    "ANTHROPIC_",
    "GEMINI_",
    "GOOGLE_",
];

pub fn is_allowed(name: &str) -> bool {
    if ALLOWED_NAMES.contains(&name) {
        return true;
    }
    let upper = name.to_uppercase();
    if name != upper && ALLOWED_NAMES.contains(&upper.as_str()) {
        return true;
    }
    ALLOWED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Snapshot of the parent environment restricted to the allow-list.
pub fn minimal_env() -> HashMap<String, String> {
    std::env::vars().filter(|(k, _)| is_allowed(k)).collect()
}
