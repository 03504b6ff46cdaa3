//! Per-run append-only log with a bounded queue and priority flushing.
//!
//! Submission never blocks on I/O: records are queued in memory, batches are
//! handed to a background writer over a bounded channel (`try_send`), and a
//! full channel marks drain-pending so flushes defer until capacity returns.
//! Distinct from the `tracing` diagnostics layer, which the CLI configures.

mod cleanup;
mod sink;

pub use cleanup::{cleanup_dead_logs, CleanupReport};
pub use sink::{FileSink, LogSink, NullSink};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;

use crate::config::RunLogSettings;

pub const WRAPPER_NAME: &str = "codeagent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn urgent(self) -> bool {
        matches!(self, LogLevel::Warn | LogLevel::Error)
    }
}

/// `<home>/.codeagent/logs/`
pub fn log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codeagent")
        .join("logs")
}

fn log_file_name(suffix: Option<&str>) -> String {
    let pid = std::process::id();
    match suffix {
        Some(s) => format!("{WRAPPER_NAME}-{pid}-{s}.log"),
        None => format!("{WRAPPER_NAME}-{pid}.log"),
    }
}

struct QueueState {
    /// Formatted records awaiting a flush, FIFO.
    queue: VecDeque<String>,
    /// Last N ERROR/WARN records for diagnostic recall.
    recent: VecDeque<String>,
    /// The writer channel was full; flushes are deferred until it drains.
    drain_pending: bool,
}

struct LogCore {
    settings: RunLogSettings,
    path: Option<PathBuf>,
    state: Mutex<QueueState>,
    tx: Mutex<Option<mpsc::Sender<String>>>,
    writer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pending_writes: AtomicUsize,
    closed: AtomicBool,
}

/// Cloneable handle to the process-wide run log. A handle created with
/// [`RunLog::disabled`] accepts and drops everything without spawning tasks.
#[derive(Clone, Default)]
pub struct RunLog {
    core: Option<Arc<LogCore>>,
}

impl RunLog {
    /// Fully inert handle; every operation is a no-op.
    pub fn disabled() -> Self {
        Self { core: None }
    }

    /// Open the standard log file under [`log_dir`] and start the writer and
    /// periodic-flush tasks. Must be called inside a tokio runtime.
    pub async fn create(settings: RunLogSettings, suffix: Option<&str>) -> std::io::Result<Self> {
        let dir = log_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(log_file_name(suffix));
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self::with_sink(
            settings,
            Box::new(FileSink::new(file)),
            Some(path),
        ))
    }

    /// Build a log over an arbitrary sink. Used for silent mode
    /// (`NullSink`) and by tests.
    pub fn with_sink(
        settings: RunLogSettings,
        mut sink: Box<dyn LogSink>,
        path: Option<PathBuf>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(settings.queue_size.max(1));

        let core = Arc::new(LogCore {
            settings,
            path,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                recent: VecDeque::new(),
                drain_pending: false,
            }),
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(None),
            pending_writes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });

        let writer_core = Arc::downgrade(&core);
        let writer = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                let res = sink.write(batch.as_bytes()).await;
                if let Some(core) = writer_core.upgrade() {
                    core.pending_writes.fetch_sub(1, Ordering::SeqCst);
                    if res.is_ok() {
                        // Capacity freed; allow deferred flushes again.
                        core.state.lock().unwrap().drain_pending = false;
                    }
                }
                if res.is_err() {
                    break;
                }
            }
            let _ = sink.shutdown().await;
        });
        *core.writer.lock().unwrap() = Some(writer);

        let tick_core = Arc::downgrade(&core);
        tokio::spawn(async move {
            let interval = match tick_core.upgrade() {
                Some(c) => c.settings.flush_interval,
                None => return,
            };
            loop {
                tokio::time::sleep(interval).await;
                let Some(core) = tick_core.upgrade() else {
                    return;
                };
                if core.closed.load(Ordering::SeqCst) {
                    return;
                }
                flush(&core);
            }
        });

        Self { core: Some(core) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.core.as_ref()?.path.as_deref()
    }

    /// Submit a record. Never blocks; after close, records are dropped.
    pub fn log(&self, level: LogLevel, text: impl AsRef<str>) {
        let Some(core) = &self.core else {
            return;
        };
        if core.closed.load(Ordering::SeqCst) {
            return;
        }

        let line = format!(
            "[{}] [{}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level.as_str(),
            text.as_ref()
        );

        let flush_now = {
            let mut state = core.state.lock().unwrap();
            state.queue.push_back(line.clone());

            if level.urgent() {
                state.recent.push_back(line);
                // Trim in batches rather than on every push.
                if state.recent.len() >= core.settings.retention * 2 {
                    let drop = state.recent.len() - core.settings.retention;
                    state.recent.drain(..drop);
                }
            }

            level.urgent() || state.queue.len() >= core.settings.queue_size
        };

        if flush_now {
            flush(core);
        }
    }

    pub fn debug(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Debug, text);
    }

    pub fn info(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Info, text);
    }

    pub fn warn(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Warn, text);
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Error, text);
    }

    /// Retained ERROR/WARN records, oldest first.
    pub fn recall(&self) -> Vec<String> {
        match &self.core {
            Some(core) => core.state.lock().unwrap().recent.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Final flush, wait for pending writes up to the close timeout, then end
    /// the sink. Idempotent; the second call is a no-op.
    pub async fn close(&self) {
        let Some(core) = &self.core else {
            return;
        };
        if core.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let deadline = Instant::now() + core.settings.close_timeout;
        loop {
            flush(core);
            let pending = core.pending_writes.load(Ordering::SeqCst);
            let queued = !core.state.lock().unwrap().queue.is_empty();
            if pending == 0 && !queued {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!("run log closed with writes still pending");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        // Dropping the sender lets the writer drain and shut the sink down.
        core.tx.lock().unwrap().take();
        let writer = core.writer.lock().unwrap().take();
        if let Some(writer) = writer {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining.max(std::time::Duration::from_millis(10)), writer)
                .await
                .is_err()
            {
                tracing::warn!("run log writer did not stop before the close timeout");
            }
        }
    }
}

/// Drain the queue into one batch and hand it to the writer without
/// blocking. A full channel leaves the queue intact and defers. While a
/// prior batch is still being written the flush is not re-entered; the
/// periodic timer or the next submission retries.
fn flush(core: &Arc<LogCore>) {
    if core.pending_writes.load(Ordering::SeqCst) > 0 {
        return;
    }
    let mut state = core.state.lock().unwrap();
    if state.queue.is_empty() {
        return;
    }

    let tx_guard = core.tx.lock().unwrap();
    let Some(tx) = tx_guard.as_ref() else {
        state.queue.clear();
        return;
    };

    let mut batch = String::new();
    for line in &state.queue {
        batch.push_str(line);
        batch.push('\n');
    }

    // Counted before the send so the writer can never decrement first.
    core.pending_writes.fetch_add(1, Ordering::SeqCst);
    match tx.try_send(batch) {
        Ok(()) => {
            state.queue.clear();
            state.drain_pending = false;
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            core.pending_writes.fetch_sub(1, Ordering::SeqCst);
            state.drain_pending = true;
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            core.pending_writes.fetch_sub(1, Ordering::SeqCst);
            state.queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct MemorySink {
        chunks: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl LogSink for MemorySink {
        async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
            self.chunks
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(chunk).into_owned());
            Ok(())
        }

        async fn shutdown(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn memory_log(settings: RunLogSettings) -> (RunLog, Arc<StdMutex<Vec<String>>>) {
        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let log = RunLog::with_sink(
            settings,
            Box::new(MemorySink {
                chunks: chunks.clone(),
            }),
            None,
        );
        (log, chunks)
    }

    #[tokio::test]
    async fn error_triggers_immediate_flush() {
        let (log, chunks) = memory_log(RunLogSettings::default());
        log.error("boom");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let written = chunks.lock().unwrap().join("");
        assert!(written.contains("[ERROR] boom"));
        assert!(written.ends_with('\n'));
        log.close().await;
    }

    #[tokio::test]
    async fn info_waits_for_capacity_or_interval() {
        let settings = RunLogSettings {
            queue_size: 3,
            flush_interval: std::time::Duration::from_secs(3600),
            ..RunLogSettings::default()
        };
        let (log, chunks) = memory_log(settings);

        log.info("one");
        log.info("two");
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(chunks.lock().unwrap().is_empty());

        // Hitting capacity flushes the whole batch in FIFO order.
        log.info("three");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let written = chunks.lock().unwrap().join("");
        let one = written.find("one").unwrap();
        let three = written.find("three").unwrap();
        assert!(one < three);
        log.close().await;
    }

    #[tokio::test]
    async fn periodic_flush_fires() {
        let settings = RunLogSettings {
            flush_interval: std::time::Duration::from_millis(20),
            ..RunLogSettings::default()
        };
        let (log, chunks) = memory_log(settings);
        log.debug("tick");
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert!(chunks.lock().unwrap().join("").contains("[DEBUG] tick"));
        log.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drops_later_records() {
        let (log, chunks) = memory_log(RunLogSettings::default());
        log.warn("before close");
        log.close().await;
        log.close().await;

        log.error("after close");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let written = chunks.lock().unwrap().join("");
        assert!(written.contains("before close"));
        assert!(!written.contains("after close"));
    }

    #[tokio::test]
    async fn recall_keeps_only_urgent_records() {
        let (log, _chunks) = memory_log(RunLogSettings::default());
        log.info("quiet");
        log.warn("w1");
        log.error("e1");
        let recalled = log.recall();
        assert_eq!(recalled.len(), 2);
        assert!(recalled[0].contains("w1"));
        assert!(recalled[1].contains("e1"));
        log.close().await;
    }

    #[tokio::test]
    async fn recall_ring_trims_at_double_capacity() {
        let settings = RunLogSettings {
            retention: 5,
            flush_interval: std::time::Duration::from_millis(10),
            ..RunLogSettings::default()
        };
        let (log, _chunks) = memory_log(settings);
        for i in 0..25 {
            log.warn(format!("w{i}"));
        }
        let recalled = log.recall();
        assert!(recalled.len() <= 10);
        assert!(recalled.last().unwrap().contains("w24"));
        log.close().await;
    }

    #[test]
    fn disabled_log_is_inert() {
        let log = RunLog::disabled();
        log.error("nothing happens");
        assert!(log.recall().is_empty());
        assert!(log.path().is_none());
    }

    #[test]
    fn file_name_shape() {
        let pid = std::process::id();
        assert_eq!(log_file_name(None), format!("codeagent-{pid}.log"));
        assert_eq!(
            log_file_name(Some("task1")),
            format!("codeagent-{pid}-task1.log")
        );
    }
}
