use thiserror::Error;

/// Validation failures caught before any child process is spawned.
/// All of these surface as exit code 2.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no task provided")]
    MissingTask,

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("working directory must be a path, not '-'")]
    WorkdirIsStdinMarker,

    #[error("working directory does not exist or is not a directory: {0}")]
    WorkdirNotADirectory(String),

    #[error("invalid agent name: {0}")]
    InvalidAgentName(String),

    #[error("timeout must be a positive number of seconds")]
    NonPositiveTimeout,

    #[error("unknown backend: {0}. Available: codex, claude, gemini, opencode")]
    UnknownBackend(String),

    #[error("backend '{command}' is not installed or not on PATH")]
    BackendUnavailable { command: String },

    #[error("cannot read prompt file {path}: {source}")]
    UnreadablePromptFile {
        path: String,
        source: std::io::Error,
    },
}
