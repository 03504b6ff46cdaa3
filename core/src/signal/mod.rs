//! Forwarding of terminal signals to the active child process.
//!
//! One bridge is installed per task execution while its child is alive; the
//! bridge forwards interrupt/terminate (and hangup where supported) to the
//! child PID and notifies the runner so the exit code can become 130.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

pub const SIGHUP: i32 = 1;
pub const SIGINT: i32 = 2;
pub const SIGTERM: i32 = 15;

static ACTIVE_BRIDGES: AtomicUsize = AtomicUsize::new(0);

/// Number of currently installed bridges. Install-then-disarm restores this
/// count exactly.
pub fn active_bridges() -> usize {
    ACTIVE_BRIDGES.load(Ordering::SeqCst)
}

/// Guard around one execution's signal forwarding. Dropping it removes the
/// listener.
pub struct SignalBridge {
    handle: tokio::task::JoinHandle<()>,
}

impl SignalBridge {
    /// Start listening and forwarding to `child_pid`. Each received signal
    /// number is also pushed into `notify` so the runner can mark the run
    /// interrupted. Must be called inside a tokio runtime.
    pub fn install(child_pid: Option<u32>, notify: mpsc::Sender<i32>) -> Self {
        ACTIVE_BRIDGES.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(listen(child_pid, notify));
        Self { handle }
    }

    pub fn disarm(self) {
        // Drop does the work.
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.handle.abort();
        ACTIVE_BRIDGES.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(unix)]
async fn listen(child_pid: Option<u32>, notify: mpsc::Sender<i32>) {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::debug;

    let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
        return;
    };
    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        return;
    };
    let Ok(mut hangup) = signal(SignalKind::hangup()) else {
        return;
    };

    loop {
        let signo = tokio::select! {
            _ = interrupt.recv() => SIGINT,
            _ = terminate.recv() => SIGTERM,
            _ = hangup.recv() => SIGHUP,
        };
        debug!(signo, "forwarding terminal signal to child");
        forward(child_pid, signo);
        if notify.send(signo).await.is_err() {
            return;
        }
    }
}

#[cfg(not(unix))]
async fn listen(_child_pid: Option<u32>, notify: mpsc::Sender<i32>) {
    // Best-effort child termination happens in the runner on these
    // platforms; here we only observe Ctrl-C.
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if notify.send(SIGINT).await.is_err() {
            return;
        }
    }
}

/// Send `signo` to the child. Failure is swallowed; the child may already be
/// gone.
#[cfg(unix)]
pub fn forward(child_pid: Option<u32>, signo: i32) {
    if let Some(pid) = child_pid {
        unsafe {
            libc::kill(pid as libc::pid_t, signo);
        }
    }
}

#[cfg(not(unix))]
pub fn forward(_child_pid: Option<u32>, _signo: i32) {}
