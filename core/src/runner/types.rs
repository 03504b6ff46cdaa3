use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config;
use crate::parser::{BackendFlavor, ProgressFn};
use crate::runlog::RunLog;

/// Immutable description of one task execution.
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    /// Stable identifier; unique within a DAG.
    pub id: String,
    /// User prompt text. May be empty only when stdin feeding is intended.
    pub task: String,
    /// Child working directory; parent cwd when unset.
    pub work_dir: Option<PathBuf>,
    /// Ids of tasks that must succeed before this one runs.
    pub dependencies: Vec<String>,
    /// Backend name; empty lets the caller resolve one.
    pub backend: Option<String>,
    pub model: Option<String>,
    /// Agent preset name. Preset resolution happens outside the core; the
    /// name is validated and carried through.
    pub agent: Option<String>,
    pub session_id: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub reasoning_effort: Option<String>,
    pub skip_permissions: bool,
    pub minimal_env: bool,
    /// Explicit request to feed the task over stdin. The runner may also
    /// choose stdin on its own for long or shell-hostile task text.
    pub use_stdin: bool,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            ..Self::default()
        }
    }
}

/// Hook applied to the parsed message before it reaches the result. The real
/// noise filter lives outside the core; the default is identity.
pub type MessageFilter = Arc<dyn Fn(&str, BackendFlavor) -> String + Send + Sync>;

/// Options for one `run_task` invocation.
#[derive(Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    /// External abort; flips to `true` at most once.
    pub abort: Option<watch::Receiver<bool>>,
    pub log: RunLog,
    pub progress: Option<ProgressFn>,
    /// Mirror child stderr lines to the wrapper stderr, `[BACKEND] `-prefixed.
    pub mirror_stderr: bool,
    pub stderr_buffer_size: usize,
    pub sanitize: Option<MessageFilter>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: config::default_timeout(),
            abort: None,
            log: RunLog::disabled(),
            progress: None,
            mirror_stderr: false,
            stderr_buffer_size: config::stderr_buffer_size(),
            sanitize: None,
        }
    }
}

/// Unified result of one task execution.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub exit_code: i32,
    pub message: String,
    pub session_id: String,
    /// Non-empty only when `exit_code != 0`; sourced from the stderr tail,
    /// never from internal traces.
    pub error: String,
    pub stderr_tail: String,
    pub log_path: Option<PathBuf>,
    pub duration_ms: u64,

    // Metric hooks, populated by an external extractor over the sanitized
    // message; the core only reserves the fields.
    pub coverage: Option<f64>,
    pub files_changed: Option<u64>,
    pub tests_passed: Option<u64>,
    pub tests_failed: Option<u64>,
    pub key_output: Option<String>,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Result synthesized for a task whose dependency failed or was skipped.
    /// No child is spawned for it.
    pub fn skipped(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            exit_code: 1,
            message: "Skipped due to dependency failure".to_string(),
            error: "Dependency failed".to_string(),
            ..Self::default()
        }
    }
}
