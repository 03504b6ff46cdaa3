use std::time::Duration;

use tokio::process::Child;
use tracing::debug;

/// Grace between the polite terminate and the hard kill.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Two-step termination: platform terminate signal first, then a hard kill
/// if the child survives the grace period. All errors are swallowed; the
/// child may already be gone.
pub async fn terminate(child: &mut Child) {
    polite_terminate(child);

    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            debug!("child survived terminate grace period, killing");
            let _ = child.start_kill();
        }
    }
}

#[cfg(unix)]
fn polite_terminate(child: &mut Child) {
    match child.id() {
        Some(pid) => unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        },
        // Already reaped.
        None => {}
    }
}

#[cfg(not(unix))]
fn polite_terminate(child: &mut Child) {
    let _ = child.start_kill();
}
