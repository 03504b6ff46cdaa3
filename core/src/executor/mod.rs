//! Dependency-aware parallel execution: topological layering, per-layer
//! worker bounds, and skip propagation through failed dependencies.

mod engine;
mod graph;
mod scheduler;
mod types;

pub use engine::{execute_graph, execute_tasks, EventFn, ExecutionOptions};
pub use graph::TaskGraph;
pub use scheduler::run_layer;
pub use types::{EngineEvent, ExecutionResult};
