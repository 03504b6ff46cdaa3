use thiserror::Error;

/// Failures inside one task execution. Task-level outcomes (timeout,
/// interrupt, spawn failure, child exit) are reported through `TaskResult`
/// exit codes, not through this type; `RunnerError` covers the plumbing.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{stream} stream error: {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },

    #[error("writing task to child stdin failed: {0}")]
    StdinWrite(std::io::Error),
}
