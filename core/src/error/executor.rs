use thiserror::Error;

/// Errors from task graph construction and layered execution.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("task '{task_id}' depends on unknown task '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("circular dependency detected: {0}")]
    CircularDependency(String),
}
