//! Backend adapters: pure argv construction per AI CLI tool.
//!
//! Argv layouts are fixed contracts with the upstream tools; tests assert
//! them verbatim.

use std::sync::Arc;

use crate::error::ConfigError;
use crate::runner::TaskSpec;

/// A ready-to-spawn command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn command(&self) -> &'static str;

    /// Build the argv for a task. `target` is either the task text or the
    /// literal `-` when the task is fed over stdin.
    fn build_args(&self, spec: &TaskSpec, target: &str) -> Vec<String>;

    fn is_available(&self) -> bool {
        which::which(self.command()).is_ok()
    }
}

pub fn build_invocation(backend: &dyn Backend, spec: &TaskSpec, target: &str) -> Invocation {
    Invocation {
        command: backend.command().to_string(),
        args: backend.build_args(spec, target),
    }
}

pub struct CodexBackend;

impl Backend for CodexBackend {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn command(&self) -> &'static str {
        "codex"
    }

    fn build_args(&self, spec: &TaskSpec, target: &str) -> Vec<String> {
        let work_dir = spec
            .work_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());

        let mut args = vec![
            "e".to_string(),
            "-C".to_string(),
            work_dir,
            "--json".to_string(),
        ];

        if let Some(sid) = &spec.session_id {
            args.push("-r".to_string());
            args.push(sid.clone());
        }
        if let Some(model) = &spec.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        if let Some(effort) = &spec.reasoning_effort {
            args.push("--reasoning-effort".to_string());
            args.push(effort.clone());
        }
        if spec.skip_permissions {
            args.push("--full-auto".to_string());
        }

        args.push(target.to_string());
        args
    }
}

pub struct ClaudeBackend;

impl Backend for ClaudeBackend {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn command(&self) -> &'static str {
        "claude"
    }

    fn build_args(&self, spec: &TaskSpec, target: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
        ];

        if spec.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        if let Some(model) = &spec.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(sid) = &spec.session_id {
            args.push("-r".to_string());
            args.push(sid.clone());
        }

        // Keeps a wrapper-launched claude from re-entering wrapper settings.
        args.push("--disable-settings-source".to_string());

        args.push(target.to_string());
        args
    }
}

pub struct GeminiBackend;

impl Backend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn command(&self) -> &'static str {
        "gemini"
    }

    fn build_args(&self, spec: &TaskSpec, target: &str) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "stream-json".to_string(), "-y".to_string()];

        if let Some(model) = &spec.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        if let Some(sid) = &spec.session_id {
            args.push("-r".to_string());
            args.push(sid.clone());
        }

        args.push(target.to_string());
        args
    }
}

pub struct OpencodeBackend;

impl Backend for OpencodeBackend {
    fn name(&self) -> &'static str {
        "opencode"
    }

    fn command(&self) -> &'static str {
        "opencode"
    }

    fn build_args(&self, spec: &TaskSpec, target: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];

        if let Some(model) = &spec.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        if let Some(sid) = &spec.session_id {
            args.push("-s".to_string());
            args.push(sid.clone());
        }

        args.push(target.to_string());
        args
    }
}

/// Resolve a backend by name (case-insensitive), or auto-detect an installed
/// one when no name is given.
pub fn select_backend(name: Option<&str>) -> Result<Arc<dyn Backend>, ConfigError> {
    match name.map(|s| s.to_lowercase()).as_deref() {
        Some("codex") => Ok(Arc::new(CodexBackend)),
        Some("claude") => Ok(Arc::new(ClaudeBackend)),
        Some("gemini") => Ok(Arc::new(GeminiBackend)),
        Some("opencode") => Ok(Arc::new(OpencodeBackend)),
        Some(other) => Err(ConfigError::UnknownBackend(other.to_string())),
        None => {
            if ClaudeBackend.is_available() {
                Ok(Arc::new(ClaudeBackend))
            } else if CodexBackend.is_available() {
                Ok(Arc::new(CodexBackend))
            } else if GeminiBackend.is_available() {
                Ok(Arc::new(GeminiBackend))
            } else if OpencodeBackend.is_available() {
                Ok(Arc::new(OpencodeBackend))
            } else {
                Err(ConfigError::BackendUnavailable {
                    command: "codex|claude|gemini|opencode".to_string(),
                })
            }
        }
    }
}

pub const BACKEND_NAMES: &[&str] = &["codex", "claude", "gemini", "opencode"];
