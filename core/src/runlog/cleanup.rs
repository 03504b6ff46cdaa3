//! Removal of log files left behind by dead wrapper processes.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    pub scanned: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Walk `dir` and delete `.log` files whose embedded PID no longer maps to a
/// live process. Symlinks and entries resolving outside `dir` are refused.
pub async fn cleanup_dead_logs(dir: &Path) -> std::io::Result<CleanupReport> {
    let mut report = CleanupReport::default();

    if !dir.is_dir() {
        return Ok(report);
    }
    let canonical_dir = dir.canonicalize()?;

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".log") {
            continue;
        }
        report.scanned += 1;

        let meta = tokio::fs::symlink_metadata(&path).await?;
        if meta.file_type().is_symlink() {
            warn!(path = %path.display(), "refusing to follow symlink in log directory");
            report.skipped += 1;
            continue;
        }

        match path.canonicalize() {
            Ok(resolved) if resolved.starts_with(&canonical_dir) => {}
            _ => {
                warn!(path = %path.display(), "refusing path resolving outside the log directory");
                report.skipped += 1;
                continue;
            }
        }

        let Some(pid) = pid_from_file_name(name) else {
            report.skipped += 1;
            continue;
        };

        if pid_alive(pid) {
            report.skipped += 1;
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), pid, "removed stale log file");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not remove stale log file");
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

/// `codeagent-<pid>[-<suffix>].log` → pid
fn pid_from_file_name(name: &str) -> Option<u32> {
    static PID_RE: OnceLock<Regex> = OnceLock::new();
    let re = PID_RE.get_or_init(|| Regex::new(r"^.+?-(\d+)(?:-.*)?\.log$").unwrap());
    re.captures(name)?.get(1)?.as_str().parse().ok()
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // kill(pid, 0) probes liveness. EPERM still means the pid exists.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // No cheap probe; leave the file alone.
    true
}
