//! Kill processes by pid when no usable handle is available.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Check if a pid exists without sending a signal.
///
/// Uses `kill` with the null signal; a permission error still means
/// the process exists.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub fn pid_exists(_pid: u32) -> bool {
    false
}

/// Kill a process by pid with SIGTERM, escalating to SIGKILL.
///
/// Used when the language-level handle has gone stale while the OS
/// process persists. Cannot reap; the OS takes care of orphans.
/// Returns once the process is observed dead or the escalation chain
/// is exhausted — never an error, kill failures are logged only.
pub async fn kill_pid(pid: u32, graceful_timeout: Duration, forced_timeout: Duration) {
    #[cfg(unix)]
    {
        kill_pid_unix(pid, graceful_timeout, forced_timeout).await;
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, graceful_timeout, forced_timeout);
    }
}

#[cfg(unix)]
async fn kill_pid_unix(pid: u32, graceful_timeout: Duration, forced_timeout: Duration) {
    let nix_pid = Pid::from_raw(pid as i32);

    match signal::kill(nix_pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return,
        Err(e) => {
            warn!(pid = %pid, error = %e, "SIGTERM failed");
            return;
        }
    }

    if poll_gone(pid, graceful_timeout).await {
        debug!(pid = %pid, "process exited after SIGTERM");
        return;
    }

    match signal::kill(nix_pid, Signal::SIGKILL) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return,
        Err(e) => {
            warn!(pid = %pid, error = %e, "SIGKILL failed");
            return;
        }
    }

    if !poll_gone(pid, forced_timeout).await {
        // No further kill attempts; the monitor layer will observe it.
        warn!(pid = %pid, "process survived SIGKILL, giving up");
    }
}

/// Poll pid existence every 100ms up to `timeout`; true once gone.
async fn poll_gone(pid: u32, timeout: Duration) -> bool {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        sleep(step).await;
        waited += step;
        if !pid_exists(pid) {
            return true;
        }
    }
    !pid_exists(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[test]
    #[cfg(unix)]
    fn pid_exists_for_self() {
        assert!(pid_exists(std::process::id()));
    }

    #[test]
    #[cfg(unix)]
    fn pid_exists_false_for_impossible_pid() {
        assert!(!pid_exists(999_999));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_pid_tolerates_already_gone() {
        // Must not hang or panic on a dead pid.
        kill_pid(999_999, Duration::from_secs(1), Duration::from_secs(1)).await;
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_pid_terminates_process() {
        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("failed to spawn sleep");
        let pid = child.id().expect("no pid");

        kill_pid(pid, Duration::from_secs(3), Duration::from_secs(1)).await;

        // Reap to avoid a zombie, then confirm death.
        let _ = child.wait().await;
        assert!(!pid_exists(pid));
    }
}
