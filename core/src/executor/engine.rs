use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ExecutorError;
use crate::runner::{TaskResult, TaskSpec};

use super::graph::TaskGraph;
use super::scheduler::run_layer;
use super::types::{EngineEvent, ExecutionResult};

pub type EventFn = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExecutionOptions {
    /// Concurrent task bound per layer; 0 means unbounded.
    pub max_workers: usize,
    /// External abort: in-flight tasks are terminated, queued tasks are
    /// never started and never recorded.
    pub abort: Option<watch::Receiver<bool>>,
    /// UI hook; called from the engine and from task futures.
    pub on_event: Option<EventFn>,
}

impl ExecutionOptions {
    fn aborted(&self) -> bool {
        self.abort.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(cb) = &self.on_event {
            cb(&event);
        }
    }
}

/// Layer the graph and run it to completion: each layer starts only after
/// the previous layer's tasks have all terminated, and a failed or skipped
/// dependency marks every dependent as skipped without spawning a child.
pub async fn execute_graph<F, Fut>(
    graph: TaskGraph,
    opts: ExecutionOptions,
    run_fn: F,
) -> Result<ExecutionResult, ExecutorError>
where
    F: Fn(TaskSpec) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = TaskResult> + Send + 'static,
{
    let started = Instant::now();
    let layers = graph.layer()?;
    let total_tasks = graph.len();

    info!(total_tasks, layers = layers.len(), "starting parallel run");
    opts.emit(EngineEvent::RunStart {
        total_tasks,
        total_layers: layers.len(),
    });

    let graph = Arc::new(graph);
    let mut results: HashMap<String, TaskResult> = HashMap::with_capacity(total_tasks);
    let mut skipped: HashSet<String> = HashSet::new();

    for (index, layer) in layers.iter().enumerate() {
        if opts.aborted() {
            debug!(layer = index, "abort requested, leaving queued layers unrecorded");
            break;
        }

        opts.emit(EngineEvent::LayerStart {
            index,
            task_ids: layer.clone(),
        });

        let mut runnable: Vec<String> = Vec::with_capacity(layer.len());
        for id in layer {
            let deps_ok = graph.dependencies_of(id).iter().all(|dep| {
                !skipped.contains(dep)
                    && results
                        .get(dep)
                        .map(|r| r.exit_code == 0)
                        .unwrap_or(false)
            });
            if deps_ok {
                runnable.push(id.clone());
            } else {
                debug!(task = %id, "dependency failed, recording skip");
                skipped.insert(id.clone());
                let result = TaskResult::skipped(id.clone());
                opts.emit(EngineEvent::TaskFinished {
                    result: result.clone(),
                });
                results.insert(id.clone(), result);
            }
        }

        let layer_results = run_layer(&runnable, opts.max_workers, {
            let graph = graph.clone();
            let opts = opts.clone();
            let run_fn = run_fn.clone();
            move |id: String| {
                let graph = graph.clone();
                let opts = opts.clone();
                let run_fn = run_fn.clone();
                async move {
                    // An abort that lands while this task is still queued
                    // behind the worker bound keeps it from starting at all.
                    if opts.aborted() {
                        return None;
                    }
                    let Some(spec) = graph.task(&id).cloned() else {
                        return None;
                    };
                    opts.emit(EngineEvent::TaskStarted {
                        task_id: id.clone(),
                    });
                    let result = run_fn(spec).await;
                    opts.emit(EngineEvent::TaskFinished {
                        result: result.clone(),
                    });
                    Some(result)
                }
            }
        })
        .await;

        results.extend(layer_results);
    }

    let ordered: Vec<TaskResult> = graph
        .input_order()
        .iter()
        .filter_map(|id| results.remove(id))
        .collect();

    let failed = ordered.iter().filter(|r| r.exit_code != 0).count();
    let summary = ExecutionResult {
        total_tasks,
        completed: ordered.len(),
        failed,
        duration_ms: started.elapsed().as_millis() as u64,
        results: ordered,
        stages: layers,
    };

    info!(
        succeeded = summary.succeeded(),
        failed = summary.failed,
        duration_ms = summary.duration_ms,
        "parallel run finished"
    );
    opts.emit(EngineEvent::RunEnd {
        succeeded: summary.succeeded(),
        failed: summary.failed,
    });

    Ok(summary)
}

/// Convenience entry: build and validate the graph, then execute it.
pub async fn execute_tasks<F, Fut>(
    tasks: Vec<TaskSpec>,
    opts: ExecutionOptions,
    run_fn: F,
) -> Result<ExecutionResult, ExecutorError>
where
    F: Fn(TaskSpec) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = TaskResult> + Send + 'static,
{
    let graph = TaskGraph::from_tasks(tasks)?;
    execute_graph(graph, opts, run_fn).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> TaskSpec {
        let mut t = TaskSpec::new(id, format!("work for {id}"));
        t.dependencies = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    fn result_for(spec: &TaskSpec, exit_code: i32) -> TaskResult {
        TaskResult {
            task_id: spec.id.clone(),
            exit_code,
            ..TaskResult::default()
        }
    }

    #[tokio::test]
    async fn empty_dag_is_empty_success() {
        let res = execute_tasks(vec![], ExecutionOptions::default(), |spec| async move {
            result_for(&spec, 0)
        })
        .await
        .unwrap();
        assert!(res.results.is_empty());
        assert_eq!(res.overall_exit_code(), 0);
    }

    #[tokio::test]
    async fn failure_skips_transitive_dependents() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let res = execute_tasks(tasks, ExecutionOptions::default(), |spec| async move {
            let code = if spec.id == "a" { 1 } else { 0 };
            result_for(&spec, code)
        })
        .await
        .unwrap();

        assert_eq!(res.results.len(), 3);
        assert_eq!(res.results[0].task_id, "a");
        assert_eq!(res.results[0].exit_code, 1);
        for r in &res.results[1..] {
            assert_eq!(r.exit_code, 1);
            assert_eq!(r.message, "Skipped due to dependency failure");
            assert_eq!(r.error, "Dependency failed");
        }
        assert_eq!(res.overall_exit_code(), 1);
    }

    #[tokio::test]
    async fn skipped_tasks_never_run() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let ran = Arc::new(AtomicUsize::new(0));

        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let ran_in = ran.clone();
        let res = execute_tasks(tasks, ExecutionOptions::default(), move |spec| {
            let ran = ran_in.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                result_for(&spec, 2)
            }
        })
        .await
        .unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(res.results.len(), 2);
        assert_eq!(res.failed, 2);
    }

    #[tokio::test]
    async fn dependency_layers_run_in_order() {
        use std::sync::Mutex;
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a"])];
        let order_in = order.clone();
        execute_tasks(tasks, ExecutionOptions::default(), move |spec| {
            let order = order_in.clone();
            async move {
                order.lock().unwrap().push(spec.id.clone());
                result_for(&spec, 0)
            }
        })
        .await
        .unwrap();

        let seen = order.lock().unwrap();
        assert_eq!(seen[0], "a");
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn cycle_fails_before_anything_runs() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let ran = Arc::new(AtomicUsize::new(0));

        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        let ran_in = ran.clone();
        let err = execute_tasks(tasks, ExecutionOptions::default(), move |spec| {
            let ran = ran_in.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                result_for(&spec, 0)
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ExecutorError::CircularDependency(_)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abort_before_start_records_nothing_for_queued_layers() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let opts = ExecutionOptions {
            abort: Some(rx),
            ..ExecutionOptions::default()
        };
        let res = execute_tasks(tasks, opts, |spec| async move { result_for(&spec, 0) })
            .await
            .unwrap();

        assert!(res.results.is_empty());
        assert_eq!(res.total_tasks, 2);
    }

    #[tokio::test]
    async fn single_task_dag_matches_single_execution() {
        let res = execute_tasks(
            vec![task("only", &[])],
            ExecutionOptions::default(),
            |spec| async move { result_for(&spec, 0) },
        )
        .await
        .unwrap();
        assert_eq!(res.results.len(), 1);
        assert_eq!(res.results[0].task_id, "only");
        assert_eq!(res.overall_exit_code(), 0);
    }
}
