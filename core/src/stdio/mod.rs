//! The stdin task-list grammar consumed in parallel mode.

mod parser;

pub use parser::{parse_task_blocks, CONTENT_MARKER, TASK_MARKER};
