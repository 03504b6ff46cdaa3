//! Command dispatch: single-task runs, resume, parallel DAG runs, and log
//! cleanup. The core returns typed errors and results; this layer maps them
//! to exit codes and user-facing messages.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::watch;

use codeagent_core::backend::select_backend;
use codeagent_core::config::{self, RunLogSettings};
use codeagent_core::error::exit;
use codeagent_core::executor::{execute_tasks, EngineEvent, ExecutionOptions};
use codeagent_core::parser::{ProgressFn, ProgressStage, ProgressUpdate};
use codeagent_core::runlog::{cleanup_dead_logs, log_dir, NullSink, RunLog};
use codeagent_core::runner::{run_task, RunOptions, TaskResult, TaskSpec};
use codeagent_core::{validate, ConfigError, ExecutorError, TaskInputError};

use crate::cli::{Cli, Command};
use crate::progress::ProgressMonitor;

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Input(TaskInputError),
    Executor(ExecutorError),
    Io(std::io::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(e) => e.fmt(f),
            CliError::Input(e) => e.fmt(f),
            CliError::Executor(e) => e.fmt(f),
            CliError::Io(e) => e.fmt(f),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<TaskInputError> for CliError {
    fn from(e: TaskInputError) -> Self {
        CliError::Input(e)
    }
}

impl From<ExecutorError> for CliError {
    fn from(e: ExecutorError) -> Self {
        CliError::Executor(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

pub fn exit_code_for(e: &CliError) -> i32 {
    match e {
        CliError::Config(ConfigError::BackendUnavailable { .. }) => exit::BACKEND_NOT_FOUND,
        CliError::Config(_) => exit::CONFIG_ERROR,
        CliError::Input(_) => exit::CONFIG_ERROR,
        CliError::Executor(_) => exit::CONFIG_ERROR,
        CliError::Io(_) => exit::GENERAL_ERROR,
    }
}

pub async fn run(cli: Cli) -> Result<i32, CliError> {
    if cli.cleanup {
        return run_cleanup().await;
    }

    match cli.command.clone() {
        Some(Command::Resume {
            session_id,
            task,
            workdir,
        }) => run_single(&cli, task, workdir, Some(session_id)).await,
        None => {
            if cli.parallel {
                run_parallel(&cli).await
            } else if let Some(task) = cli.task.clone() {
                run_single(&cli, task, cli.workdir.clone(), None).await
            } else {
                Err(CliError::Config(ConfigError::MissingTask))
            }
        }
    }
}

async fn run_cleanup() -> Result<i32, CliError> {
    let report = cleanup_dead_logs(&log_dir()).await?;
    println!(
        "Removed {} stale log file(s) ({} scanned, {} kept)",
        report.deleted, report.scanned, report.skipped
    );
    Ok(exit::SUCCESS)
}

async fn run_single(
    cli: &Cli,
    task_raw: String,
    workdir: Option<String>,
    session_id: Option<String>,
) -> Result<i32, CliError> {
    let piped = task_raw == "-";
    let task_text = if piped {
        read_all_stdin().await?
    } else {
        task_raw
    };
    if task_text.trim().is_empty() {
        return Err(CliError::Config(ConfigError::MissingTask));
    }

    if let Some(sid) = &session_id {
        validate::session_id(sid)?;
    }
    if let Some(agent) = &cli.agent {
        validate::agent_name(agent)?;
    }
    if let Some(secs) = cli.timeout {
        validate::timeout_secs(secs)?;
    }
    let work_dir = workdir.as_deref().map(validate::work_dir).transpose()?;
    let prompt_file = cli.prompt_file.as_ref().map(PathBuf::from);
    if let Some(path) = &prompt_file {
        validate::prompt_file(path)?;
    }

    let backend = select_backend(cli.backend.as_deref())?;
    // Single-task mode checks availability up front; parallel mode leaves
    // it to spawn so mixed-backend task lists still partially run.
    if !backend.is_available() {
        return Err(CliError::Config(ConfigError::BackendUnavailable {
            command: backend.command().to_string(),
        }));
    }

    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(config::default_timeout);

    let log = open_run_log(cli.quiet, None).await;

    let mut spec = TaskSpec::new("main", task_text);
    spec.work_dir = work_dir;
    spec.backend = cli.backend.clone();
    spec.model = cli.model.clone();
    spec.agent = cli.agent.clone();
    spec.session_id = session_id;
    spec.prompt_file = prompt_file;
    spec.reasoning_effort = cli.reasoning_effort.clone();
    spec.skip_permissions = cli.skip_permissions;
    spec.minimal_env = cli.minimal_env;
    spec.use_stdin = piped;

    let opts = RunOptions {
        timeout,
        abort: None,
        log: log.clone(),
        progress: progress_callback(cli),
        mirror_stderr: cli.mirror_backend_stderr(),
        stderr_buffer_size: config::stderr_buffer_size(),
        sanitize: None,
    };

    let result = run_task(&spec, backend.as_ref(), &opts).await;
    log.close().await;

    if !result.message.is_empty() {
        println!("{}", result.message);
    }
    if !cli.quiet && !result.session_id.is_empty() {
        eprintln!("session: {}", result.session_id);
    }
    if result.exit_code != exit::SUCCESS {
        report_failure(&result, backend.name(), timeout);
    }

    Ok(result.exit_code)
}

async fn run_parallel(cli: &Cli) -> Result<i32, CliError> {
    let input = read_all_stdin().await?;
    let mut tasks = codeagent_core::stdio::parse_task_blocks(&input)?;
    tracing::debug!(tasks = tasks.len(), "parsed parallel task list");

    for task in &mut tasks {
        if task.backend.is_none() {
            task.backend = cli.backend.clone();
        }
        if task.model.is_none() {
            task.model = cli.model.clone();
        }
        if task.agent.is_none() {
            task.agent = cli.agent.clone();
        }
        task.reasoning_effort = cli.reasoning_effort.clone();
        task.skip_permissions |= cli.skip_permissions;
        task.minimal_env |= cli.minimal_env;
    }

    // Unknown backend names are a configuration error before anything
    // spawns; availability is not pre-checked here.
    for task in &tasks {
        if let Some(name) = &task.backend {
            select_backend(Some(name))?;
        }
        if let Some(agent) = &task.agent {
            validate::agent_name(agent)?;
        }
        if let Some(sid) = &task.session_id {
            validate::session_id(sid)?;
        }
    }
    if let Some(secs) = cli.timeout {
        validate::timeout_secs(secs)?;
    }

    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(config::default_timeout);
    let max_workers = cli
        .max_parallel_workers
        .unwrap_or_else(config::default_max_workers);

    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = abort_tx.send(true);
        }
        // Keep the sender alive so receivers stay valid.
        std::future::pending::<()>().await;
    });

    let monitor = Arc::new(ProgressMonitor::new(
        tasks.len(),
        !cli.quiet && atty::is(atty::Stream::Stderr),
        config::ascii_mode(),
    ));
    let on_event: codeagent_core::executor::EventFn = {
        let monitor = monitor.clone();
        Arc::new(move |event: &EngineEvent| monitor.handle(event))
    };

    let exec_opts = ExecutionOptions {
        max_workers,
        abort: Some(abort_rx.clone()),
        on_event: Some(on_event),
    };

    let mirror = cli.mirror_backend_stderr();
    let quiet = cli.quiet;
    let run_fn = {
        let abort_rx = abort_rx.clone();
        move |spec: TaskSpec| {
            let abort_rx = abort_rx.clone();
            async move {
                let backend = match select_backend(spec.backend.as_deref()) {
                    Ok(backend) => backend,
                    Err(e) => {
                        return TaskResult {
                            task_id: spec.id.clone(),
                            exit_code: exit::BACKEND_NOT_FOUND,
                            error: e.to_string(),
                            ..TaskResult::default()
                        }
                    }
                };

                let log = open_run_log(quiet, Some(&spec.id)).await;

                let opts = RunOptions {
                    timeout,
                    abort: Some(abort_rx),
                    log: log.clone(),
                    progress: None,
                    mirror_stderr: mirror,
                    stderr_buffer_size: config::stderr_buffer_size(),
                    sanitize: None,
                };
                let result = run_task(&spec, backend.as_ref(), &opts).await;
                log.close().await;
                result
            }
        }
    };

    let res = execute_tasks(tasks, exec_opts, run_fn).await?;
    drop(monitor);

    for result in &res.results {
        if cli.full_output {
            println!("=== {} (exit {}) ===", result.task_id, result.exit_code);
            if !result.message.is_empty() {
                println!("{}", result.message);
            }
            if result.exit_code != 0 && !result.error.is_empty() {
                eprintln!("[{}] {}", result.task_id, result.error);
            }
        } else {
            let status = if result.exit_code == 0 { "ok" } else { "failed" };
            println!(
                "{}\t{}\t{}\t{}",
                result.task_id, status, result.exit_code, result.session_id
            );
        }
    }
    if !cli.quiet {
        eprintln!(
            "{} succeeded, {} failed, {} of {} recorded in {} ms",
            res.succeeded(),
            res.failed,
            res.completed,
            res.total_tasks,
            res.duration_ms
        );
    }

    if *abort_rx.borrow() {
        return Ok(exit::INTERRUPTED);
    }
    Ok(res.overall_exit_code())
}

/// Silent mode keeps the full queue/flush contract but ends in a no-op
/// sink; otherwise the standard log file is opened.
async fn open_run_log(quiet: bool, suffix: Option<&str>) -> RunLog {
    if quiet {
        return RunLog::with_sink(RunLogSettings::from_env(), Box::new(NullSink), None);
    }
    match RunLog::create(RunLogSettings::from_env(), suffix).await {
        Ok(log) => log,
        Err(e) => {
            eprintln!("codeagent: run log unavailable ({e}); continuing without it");
            RunLog::disabled()
        }
    }
}

fn progress_callback(cli: &Cli) -> Option<ProgressFn> {
    if cli.quiet {
        return None;
    }
    let ascii = config::ascii_mode();
    let last: Mutex<Option<ProgressStage>> = Mutex::new(None);
    let callback: ProgressFn = Arc::new(move |update: &ProgressUpdate| {
        let mut last = last.lock().unwrap();
        if *last == Some(update.stage) && update.tool.is_none() {
            return;
        }
        *last = Some(update.stage);

        let arrow = if ascii { "->" } else { "→" };
        let label = match update.stage {
            ProgressStage::Started => "started",
            ProgressStage::Analyzing => "analyzing",
            ProgressStage::Executing => "executing",
            ProgressStage::Completed => "completed",
        };
        match &update.tool {
            Some(tool) => eprintln!("{arrow} {label} ({tool})"),
            None => eprintln!("{arrow} {label}"),
        }
    });
    Some(callback)
}

pub fn report_error(e: &CliError) {
    match e {
        CliError::Config(ConfigError::BackendUnavailable { command }) => {
            eprintln!("codeagent: backend '{command}' is not installed or not on PATH.");
            if let Some(hint) = install_hint(command) {
                eprintln!("  hint: {hint}");
            }
        }
        CliError::Config(e) => eprintln!("codeagent: {e}"),
        CliError::Input(e) => eprintln!("codeagent: invalid task list: {e}"),
        CliError::Executor(e) => eprintln!("codeagent: {e}"),
        CliError::Io(e) => eprintln!("codeagent: {e}"),
    }
}

fn report_failure(result: &TaskResult, backend: &str, timeout: Duration) {
    match result.exit_code {
        exit::BACKEND_NOT_FOUND => {
            eprintln!("codeagent: backend '{backend}' could not be started.");
            if let Some(hint) = install_hint(backend) {
                eprintln!("  hint: {hint}");
            }
        }
        exit::TIMEOUT => {
            eprintln!(
                "codeagent: task timed out after {} s. Raise --timeout or CODEX_TIMEOUT.",
                timeout.as_secs()
            );
        }
        exit::INTERRUPTED => {
            eprintln!("codeagent: interrupted.");
        }
        code => {
            eprintln!("codeagent: backend exited with code {code}.");
        }
    }

    if !result.stderr_tail.trim().is_empty() {
        eprintln!("--- backend stderr (tail) ---");
        eprintln!("{}", result.stderr_tail.trim_end());
    }
    if let Some(path) = &result.log_path {
        eprintln!("log: {}", path.display());
    }
}

fn install_hint(backend: &str) -> Option<&'static str> {
    match backend {
        "codex" => Some("npm install -g @openai/codex"),
        "claude" => Some("npm install -g @anthropic-ai/claude-code"),
        "gemini" => Some("npm install -g @google/gemini-cli"),
        "opencode" => Some("npm install -g opencode-ai"),
        _ => None,
    }
}

async fn read_all_stdin() -> Result<String, CliError> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_error_kind() {
        let unavailable = CliError::Config(ConfigError::BackendUnavailable {
            command: "codex".into(),
        });
        assert_eq!(exit_code_for(&unavailable), 127);

        let unknown = CliError::Config(ConfigError::UnknownBackend("x".into()));
        assert_eq!(exit_code_for(&unknown), 2);

        let cycle = CliError::Executor(ExecutorError::CircularDependency("a -> b".into()));
        assert_eq!(exit_code_for(&cycle), 2);

        let io = CliError::Io(std::io::Error::other("disk on fire"));
        assert_eq!(exit_code_for(&io), 1);
    }

    #[test]
    fn install_hints_cover_all_backends() {
        for name in ["codex", "claude", "gemini", "opencode"] {
            assert!(install_hint(name).is_some());
        }
        assert!(install_hint("sh").is_none());
    }
}
