use thiserror::Error;

/// Errors from the `---TASK---` block grammar consumed in parallel mode.
#[derive(Error, Debug)]
pub enum TaskInputError {
    #[error("task block is missing the ---CONTENT--- marker")]
    MissingContentMarker,

    #[error("invalid task id: {0}")]
    InvalidId(String),

    #[error("duplicate task id: {0}")]
    DuplicateId(String),

    #[error("task '{task}' depends on unknown task '{dep}'")]
    UnknownDependency { task: String, dep: String },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
