use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::backend::{build_invocation, Backend};
use crate::error::{exit, RunnerError};
use crate::parser::{ParsedStream, StreamParser};
use crate::signal::SignalBridge;
use crate::util::RingBytes;

use super::env;
use super::io_pump;
use super::terminate::terminate;
use super::types::{RunOptions, TaskResult, TaskSpec};

/// Task text longer than this always goes over stdin.
const STDIN_LENGTH_THRESHOLD: usize = 800;

/// Characters that make argv transport unreliable across shells.
const STDIN_FORCING_CHARS: &[char] = &['\n', '\\', '"', '`', '\'', '$'];

/// Decide whether the task text is fed over stdin (target arg becomes `-`).
pub fn should_use_stdin(explicit: bool, task: &str) -> bool {
    explicit
        || task.len() > STDIN_LENGTH_THRESHOLD
        || task.contains(STDIN_FORCING_CHARS)
}

/// Exit-code derivation, in priority order. Deterministic in its inputs.
pub fn derive_exit_code(
    timed_out: bool,
    interrupted: bool,
    spawn_failed: bool,
    child_code: Option<i32>,
) -> i32 {
    if timed_out {
        exit::TIMEOUT
    } else if interrupted {
        exit::INTERRUPTED
    } else if spawn_failed {
        exit::BACKEND_NOT_FOUND
    } else {
        child_code.unwrap_or(exit::GENERAL_ERROR)
    }
}

/// Execute one task: spawn the backend, feed stdin, parse stdout, bound
/// stderr, and race child exit against the three cancel sources (timeout,
/// external abort, OS signal). Task-level failures are reported through the
/// result's exit code; this function does not fail.
pub async fn run_task(spec: &TaskSpec, backend: &dyn Backend, opts: &RunOptions) -> TaskResult {
    let started = Instant::now();
    let log = &opts.log;

    let task_text = match &spec.prompt_file {
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(prompt) => format!("{prompt}\n\n=== TASK ===\n{}", spec.task),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "prompt file unreadable, continuing without it");
                log.warn(format!(
                    "prompt file {} unreadable: {e}",
                    path.display()
                ));
                spec.task.clone()
            }
        },
        None => spec.task.clone(),
    };

    let use_stdin = should_use_stdin(spec.use_stdin, &task_text);
    let target = if use_stdin { "-" } else { task_text.as_str() };
    let invocation = build_invocation(backend, spec, target);

    info!(
        task = %spec.id,
        backend = backend.name(),
        command = %invocation.command,
        use_stdin,
        "starting backend process"
    );
    log.info(format!(
        "task '{}': spawning {} ({} args)",
        spec.id,
        invocation.command,
        invocation.args.len()
    ));

    let mut cmd = Command::new(&invocation.command);
    cmd.args(&invocation.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.work_dir {
        cmd.current_dir(dir);
    }
    if spec.minimal_env {
        cmd.env_clear();
        cmd.envs(env::minimal_env());
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let err = RunnerError::Spawn {
                command: invocation.command.clone(),
                source: e,
            };
            warn!(error = %err, "spawn failed");
            log.error(format!("task '{}': {err}", spec.id));
            return TaskResult {
                task_id: spec.id.clone(),
                exit_code: derive_exit_code(false, false, true, None),
                error: err.to_string(),
                log_path: log.path().map(ToOwned::to_owned),
                duration_ms: started.elapsed().as_millis() as u64,
                ..TaskResult::default()
            };
        }
    };

    // Stdin is written from its own task so a child that talks before it
    // reads cannot deadlock the runner; it closes on drop either way.
    let stdin = child.stdin.take();
    let stdin_payload = use_stdin.then(|| task_text.clone());
    let stdin_task = tokio::spawn(async move {
        if let (Some(mut stdin), Some(payload)) = (stdin, stdin_payload) {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                let err = RunnerError::StdinWrite(e);
                debug!(error = %err, "stdin feed ended early");
            }
            let _ = stdin.shutdown().await;
        }
    });

    let parser_task = child.stdout.take().map(|stdout| {
        let parser = StreamParser::new(opts.progress.clone());
        tokio::spawn(parser.consume(stdout))
    });

    let stderr_ring = RingBytes::new(opts.stderr_buffer_size);
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| io_pump::pump_stderr(stderr, stderr_ring.clone(), opts.mirror_stderr));

    let (sig_tx, mut sig_rx) = mpsc::channel::<i32>(4);
    let bridge = SignalBridge::install(child.id(), sig_tx);

    let timeout_sleep = tokio::time::sleep(opts.timeout);
    tokio::pin!(timeout_sleep);
    let mut abort_rx = opts.abort.clone();

    let mut timed_out = false;
    let mut interrupted = false;
    let mut forwarded_signal = false;

    let raw_status = loop {
        let cancelled = timed_out || interrupted;
        tokio::select! {
            status = child.wait() => break status.ok(),

            _ = &mut timeout_sleep, if !cancelled => {
                timed_out = true;
                warn!(task = %spec.id, timeout = ?opts.timeout, "task timed out");
                log.warn(format!("task '{}': timed out after {:?}", spec.id, opts.timeout));
            }

            aborted = wait_abort(&mut abort_rx), if !cancelled => {
                if aborted {
                    interrupted = true;
                    log.warn(format!("task '{}': aborted", spec.id));
                }
            }

            Some(signo) = sig_rx.recv(), if !cancelled => {
                interrupted = true;
                forwarded_signal = true;
                log.warn(format!("task '{}': received signal {signo}", spec.id));
            }
        }

        if (timed_out || interrupted) && !(forwarded_signal && cfg!(unix)) {
            // Timeout and external abort run the termination protocol; an OS
            // signal was already forwarded to the child by the bridge.
            terminate(&mut child).await;
        }
    };

    bridge.disarm();

    // EOF cascades from termination; the parser is never pre-empted
    // mid-line. A failed stream is treated as an empty parse and the child
    // exit is honored.
    let parsed = match parser_task {
        Some(handle) => match handle.await {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(e)) => {
                let err = RunnerError::StreamIo {
                    stream: "stdout",
                    source: e,
                };
                warn!(task = %spec.id, error = %err, "stdout parse aborted");
                log.warn(format!("task '{}': {err}", spec.id));
                ParsedStream::default()
            }
            Err(_) => ParsedStream::default(),
        },
        None => ParsedStream::default(),
    };

    if let Some(handle) = stderr_task {
        let _ = handle.await;
    }
    stdin_task.abort();

    let child_code = raw_status.as_ref().and_then(|s| s.code());
    let exit_code = derive_exit_code(timed_out, interrupted, false, child_code);
    let duration_ms = started.elapsed().as_millis() as u64;

    let message = match &opts.sanitize {
        Some(filter) => filter(&parsed.message, parsed.flavor),
        None => parsed.message.clone(),
    };

    let stderr_tail = if exit_code != 0 {
        stderr_ring.tail_string()
    } else {
        String::new()
    };

    let error = if exit_code == 0 {
        String::new()
    } else if !stderr_tail.trim().is_empty() {
        stderr_tail.trim().to_string()
    } else if timed_out {
        format!("timed out after {} ms", opts.timeout.as_millis())
    } else if interrupted {
        "interrupted".to_string()
    } else {
        format!("backend exited with code {exit_code}")
    };

    info!(
        task = %spec.id,
        exit_code,
        duration_ms,
        flavor = %parsed.flavor,
        events = parsed.events,
        truncated = parsed.truncated,
        "task finished"
    );
    log.info(format!(
        "task '{}': finished with exit code {exit_code} in {duration_ms} ms",
        spec.id
    ));
    if crate::config::performance_metrics() {
        debug!(
            task = %spec.id,
            duration_ms,
            message_bytes = parsed.message.len(),
            "performance metrics"
        );
    }

    TaskResult {
        task_id: spec.id.clone(),
        exit_code,
        message,
        session_id: parsed.session_id,
        error,
        stderr_tail,
        log_path: log.path().map(ToOwned::to_owned),
        duration_ms,
        ..TaskResult::default()
    }
}

/// Resolve to `true` when the external abort fires; pend forever otherwise.
async fn wait_abort(rx: &mut Option<watch::Receiver<bool>>) -> bool {
    match rx {
        Some(rx) => loop {
            if *rx.borrow() {
                return true;
            }
            if rx.changed().await.is_err() {
                // Abort source dropped without firing.
                return std::future::pending().await;
            }
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_priority_is_total() {
        // timeout beats everything
        assert_eq!(derive_exit_code(true, true, true, Some(0)), 124);
        // then interrupt
        assert_eq!(derive_exit_code(false, true, true, Some(0)), 130);
        // then spawn failure
        assert_eq!(derive_exit_code(false, false, true, Some(0)), 127);
        // then the child's own code
        assert_eq!(derive_exit_code(false, false, false, Some(0)), 0);
        assert_eq!(derive_exit_code(false, false, false, Some(3)), 3);
        // unknown child code degrades to generic failure
        assert_eq!(derive_exit_code(false, false, false, None), 1);
    }

    #[test]
    fn stdin_for_long_tasks() {
        assert!(!should_use_stdin(false, &"a".repeat(800)));
        assert!(should_use_stdin(false, &"a".repeat(801)));
    }

    #[test]
    fn stdin_for_shell_hostile_text() {
        for task in [
            "line one\nline two",
            "back\\slash",
            "say \"hi\"",
            "tick `cmd`",
            "it's fine",
            "cost $5",
        ] {
            assert!(should_use_stdin(false, task), "{task:?}");
        }
    }

    #[test]
    fn stdin_explicit_request_wins() {
        assert!(should_use_stdin(true, "short and plain"));
        assert!(!should_use_stdin(false, "short and plain"));
    }
}
