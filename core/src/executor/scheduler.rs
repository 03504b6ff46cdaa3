use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::runner::TaskResult;

/// Run one layer's tasks concurrently under a worker bound.
///
/// `max_workers` of 0, or at least the layer size, means unbounded. Permits
/// are RAII, so a task body that panics still releases its slot; the panic
/// becomes a failed result for that task. A body may return `None` to
/// decline running (used when an abort lands before its slot frees); such
/// tasks are omitted from the result map.
pub async fn run_layer<F, Fut>(
    task_ids: &[String],
    max_workers: usize,
    run_fn: F,
) -> HashMap<String, TaskResult>
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Option<TaskResult>> + Send + 'static,
{
    let permits = if max_workers == 0 || max_workers >= task_ids.len() {
        task_ids.len().max(1)
    } else {
        max_workers
    };
    let sem = Arc::new(Semaphore::new(permits));

    let mut in_flight: FuturesUnordered<_> = task_ids
        .iter()
        .map(|id| {
            let id = id.clone();
            let sem = sem.clone();
            let run_fn = run_fn.clone();
            async move {
                let _permit = sem.acquire_owned().await;
                let task_id = id.clone();
                match tokio::spawn(run_fn(id)).await {
                    Ok(result) => result,
                    Err(e) => Some(TaskResult {
                        task_id,
                        exit_code: 1,
                        error: format!("task body failed: {e}"),
                        ..TaskResult::default()
                    }),
                }
            }
        })
        .collect();

    let mut results = HashMap::with_capacity(task_ids.len());
    while let Some(outcome) = in_flight.next().await {
        if let Some(result) = outcome {
            results.insert(result.task_id.clone(), result);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn ok(id: &str) -> TaskResult {
        TaskResult {
            task_id: id.to_string(),
            ..TaskResult::default()
        }
    }

    #[tokio::test]
    async fn runs_every_task_and_keys_results_by_id() {
        let results =
            run_layer(&ids(&["a", "b", "c"]), 0, |id| async move { Some(ok(&id)) }).await;
        assert_eq!(results.len(), 3);
        assert!(results.contains_key("b"));
    }

    #[tokio::test]
    async fn worker_bound_limits_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_layer(&ids(&["a", "b", "c", "d", "e"]), 2, {
            let active = active.clone();
            let peak = peak.clone();
            move |id| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Some(ok(&id))
                }
            }
        })
        .await;

        assert_eq!(results.len(), 5);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panicking_task_releases_its_slot() {
        let results = run_layer(&ids(&["boom", "fine"]), 1, |id| async move {
            if id == "boom" {
                panic!("task body exploded");
            }
            Some(ok(&id))
        })
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["boom"].exit_code, 1);
        assert!(results["boom"].error.contains("task body failed"));
        assert_eq!(results["fine"].exit_code, 0);
    }

    #[tokio::test]
    async fn declined_tasks_are_omitted() {
        let results = run_layer(&ids(&["a", "b"]), 0, |id| async move {
            if id == "b" {
                None
            } else {
                Some(ok(&id))
            }
        })
        .await;
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("a"));
    }

    #[tokio::test]
    async fn empty_layer_is_empty_result() {
        let results = run_layer(&[], 4, |id| async move { Some(ok(&id)) }).await;
        assert!(results.is_empty());
    }
}
