//! Runtime knobs, all overridable through `CODEAGENT_*` environment
//! variables (plus the legacy `CODEX_TIMEOUT`).

use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 7200;
pub const DEFAULT_STDERR_BUFFER_SIZE: usize = 64 * 1024;

pub const ENV_TIMEOUT: &str = "CODEX_TIMEOUT";
pub const ENV_STDERR_BUFFER_SIZE: &str = "CODEAGENT_STDERR_BUFFER_SIZE";
pub const ENV_MAX_PARALLEL_WORKERS: &str = "CODEAGENT_MAX_PARALLEL_WORKERS";
pub const ENV_ASCII_MODE: &str = "CODEAGENT_ASCII_MODE";
pub const ENV_PERFORMANCE_METRICS: &str = "CODEAGENT_PERFORMANCE_METRICS";
pub const ENV_LOG_QUEUE_SIZE: &str = "CODEAGENT_LOGGER_QUEUE_SIZE";
pub const ENV_LOG_FLUSH_INTERVAL_MS: &str = "CODEAGENT_LOGGER_FLUSH_INTERVAL_MS";
pub const ENV_LOG_CLOSE_TIMEOUT_MS: &str = "CODEAGENT_LOGGER_CLOSE_TIMEOUT_MS";

/// "Set and not zero" convention for boolean environment toggles.
pub fn env_flag(name: &str) -> bool {
    std::env::var_os(name)
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false)
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Interpret a raw timeout value the way the legacy wrapper did: values over
/// 10 000 are milliseconds, everything else is seconds.
pub fn timeout_from_raw(raw: u64) -> Duration {
    if raw > 10_000 {
        Duration::from_millis(raw)
    } else {
        Duration::from_secs(raw)
    }
}

/// Per-task timeout: `CODEX_TIMEOUT` when set, else the default.
pub fn default_timeout() -> Duration {
    match env_number::<u64>(ENV_TIMEOUT) {
        Some(raw) if raw > 0 => timeout_from_raw(raw),
        _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
}

/// Cap on the retained stderr ring per task.
pub fn stderr_buffer_size() -> usize {
    match env_number::<usize>(ENV_STDERR_BUFFER_SIZE) {
        Some(n) if n > 0 => n,
        _ => DEFAULT_STDERR_BUFFER_SIZE,
    }
}

/// Worker bound for parallel mode. Scales with the CPU count and is clamped
/// to a sane range; `CODEAGENT_MAX_PARALLEL_WORKERS` overrides.
pub fn default_max_workers() -> usize {
    if let Some(n) = env_number::<usize>(ENV_MAX_PARALLEL_WORKERS) {
        return n.max(1);
    }
    let cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    (cpus * 4).clamp(1, 100)
}

pub fn ascii_mode() -> bool {
    env_flag(ENV_ASCII_MODE)
}

pub fn performance_metrics() -> bool {
    env_flag(ENV_PERFORMANCE_METRICS)
}

/// Settings for the asynchronous run log (`runlog` module).
#[derive(Debug, Clone)]
pub struct RunLogSettings {
    pub queue_size: usize,
    pub flush_interval: Duration,
    pub close_timeout: Duration,
    /// Retained ERROR/WARN records for diagnostic recall.
    pub retention: usize,
}

impl Default for RunLogSettings {
    fn default() -> Self {
        Self {
            queue_size: 100,
            flush_interval: Duration::from_millis(200),
            close_timeout: Duration::from_millis(5000),
            retention: 100,
        }
    }
}

impl RunLogSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_size: env_number::<usize>(ENV_LOG_QUEUE_SIZE)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.queue_size),
            flush_interval: env_number::<u64>(ENV_LOG_FLUSH_INTERVAL_MS)
                .filter(|n| *n > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            close_timeout: env_number::<u64>(ENV_LOG_CLOSE_TIMEOUT_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.close_timeout),
            retention: defaults.retention,
        }
    }
}
