//! Diagnostics (`tracing`) setup: a stderr layer plus a non-blocking file
//! layer under the wrapper's log directory. Distinct from the per-run log
//! the core writes.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init(cli: &Cli) -> Result<(), String> {
    let default_level = if cli.debug {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(default_level).map_err(|e| e.to_string())?,
    };

    let file_layer = match std::fs::create_dir_all(codeagent_core::runlog::log_dir()) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(
                codeagent_core::runlog::log_dir(),
                "codeagent-diagnostics.log",
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        }
        Err(_) => None,
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| e.to_string())
}
