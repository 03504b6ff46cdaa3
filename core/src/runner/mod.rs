//! One task execution: child lifecycle, stdin feeding, stdout parsing,
//! bounded stderr capture, cancellation, and exit-code derivation.

mod env;
mod io_pump;
mod runtime;
mod terminate;
mod types;

pub use env::{is_allowed as env_is_allowed, minimal_env};
pub use io_pump::BACKEND_PREFIX;
pub use runtime::{derive_exit_code, run_task, should_use_stdin};
pub use terminate::TERMINATE_GRACE;
pub use types::{MessageFilter, RunOptions, TaskResult, TaskSpec};
