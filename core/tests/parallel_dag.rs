//! DAG execution over real shell children.

#![cfg(unix)]

use std::time::Duration;

use codeagent_core::executor::{execute_tasks, ExecutionOptions};
use codeagent_core::runner::{run_task, RunOptions, TaskSpec};
use codeagent_core::Backend;

struct ShBackend;

impl Backend for ShBackend {
    fn name(&self) -> &'static str {
        "sh"
    }

    fn command(&self) -> &'static str {
        "sh"
    }

    fn build_args(&self, _spec: &TaskSpec, target: &str) -> Vec<String> {
        if target == "-" {
            Vec::new()
        } else {
            vec!["-c".to_string(), target.to_string()]
        }
    }
}

fn task(id: &str, script: &str, deps: &[&str]) -> TaskSpec {
    let mut t = TaskSpec::new(id, script);
    t.dependencies = deps.iter().map(|s| s.to_string()).collect();
    t
}

async fn run_with_sh(spec: TaskSpec) -> codeagent_core::TaskResult {
    let options = RunOptions {
        timeout: Duration::from_secs(30),
        ..RunOptions::default()
    };
    run_task(&spec, &ShBackend, &options).await
}

#[tokio::test]
async fn chain_skips_after_root_failure() {
    let tasks = vec![
        task("a", "exit 1", &[]),
        task("b", "echo never >&2", &["a"]),
        task("c", "echo never >&2", &["b"]),
    ];

    let res = execute_tasks(tasks, ExecutionOptions::default(), |spec| run_with_sh(spec))
        .await
        .unwrap();

    assert_eq!(res.results.len(), 3);
    let ids: Vec<&str> = res.results.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    assert_eq!(res.results[0].exit_code, 1);
    assert_eq!(res.results[1].exit_code, 1);
    assert_eq!(res.results[1].message, "Skipped due to dependency failure");
    assert_eq!(res.results[2].exit_code, 1);
    assert_eq!(res.results[2].message, "Skipped due to dependency failure");
    assert_eq!(res.overall_exit_code(), 1);
    assert_eq!(res.succeeded(), 0);
}

#[tokio::test]
async fn diamond_runs_everything_on_success() {
    let tasks = vec![
        task("a", r#"printf '{"result":"A"}\n'"#, &[]),
        task("b", r#"printf '{"result":"B"}\n'"#, &["a"]),
        task("c", r#"printf '{"result":"C"}\n'"#, &["a"]),
        task("d", r#"printf '{"result":"D"}\n'"#, &["b", "c"]),
    ];

    let res = execute_tasks(tasks, ExecutionOptions::default(), |spec| run_with_sh(spec))
        .await
        .unwrap();

    assert_eq!(res.results.len(), 4);
    assert_eq!(res.overall_exit_code(), 0);
    assert_eq!(res.succeeded(), 4);
    assert_eq!(res.results[3].message, "D");
    assert_eq!(res.stages.len(), 3);
}

#[tokio::test]
async fn worker_bound_is_respected_with_real_children() {
    let tasks = vec![
        task("w1", "sleep 0.2", &[]),
        task("w2", "sleep 0.2", &[]),
        task("w3", "sleep 0.2", &[]),
    ];

    let opts = ExecutionOptions {
        max_workers: 1,
        ..ExecutionOptions::default()
    };
    let started = std::time::Instant::now();
    let res = execute_tasks(tasks, opts, |spec| run_with_sh(spec)).await.unwrap();

    assert_eq!(res.succeeded(), 3);
    // Serialized: three 200 ms sleeps cannot finish in parallel time.
    assert!(started.elapsed() >= Duration::from_millis(500));
}
