//! Engine termination with graceful → forced escalation.
//!
//! Termination has two paths because the language-level handle can
//! become unusable across host lifecycle transitions while the OS
//! process persists: prefer the handle, fall back to the tracked pid.

mod pid;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use xraytun_core::ports::EngineProcess;

use super::state::PID_UNKNOWN;

pub use pid::{kill_pid, pid_exists};

/// Bounded wait after a graceful terminate request.
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(3);
/// Bounded wait after a forced kill.
pub const FORCED_TIMEOUT: Duration = Duration::from_secs(1);

/// Terminate an engine process, preferring the handle but never
/// depending on it.
///
/// The effective pid prefers `tracked_pid` over one queried from the
/// handle. With a handle: graceful terminate, wait up to 3s, then
/// forced, wait up to 1s. Without a handle, or when the handle path
/// failed to confirm death, the effective pid is liveness-checked and
/// killed directly with the same escalation. Idempotent: calling this
/// on an already-dead process performs no destructive action.
pub async fn kill_process_safely(process: Option<Arc<dyn EngineProcess>>, tracked_pid: i64) {
    let effective_pid = if tracked_pid > 0 {
        u32::try_from(tracked_pid).ok()
    } else {
        process.as_ref().and_then(|p| p.pid())
    };

    let mut confirmed_dead = false;

    if let Some(handle) = process {
        if !handle.is_alive() {
            confirmed_dead = true;
        } else {
            if let Err(e) = handle.terminate(false).await {
                debug!(error = %e, "graceful terminate failed");
            }
            if handle.wait_exit(GRACEFUL_TIMEOUT).await {
                confirmed_dead = true;
            } else {
                if let Err(e) = handle.terminate(true).await {
                    debug!(error = %e, "forced terminate failed");
                }
                confirmed_dead = handle.wait_exit(FORCED_TIMEOUT).await;
            }
        }
    }

    if confirmed_dead {
        return;
    }

    // Handle path unavailable or unconfirmed: fall back to the pid.
    match effective_pid {
        Some(pid) if pid_exists(pid) => {
            debug!(pid = %pid, "falling back to kill by pid");
            kill_pid(pid, GRACEFUL_TIMEOUT, FORCED_TIMEOUT).await;
        }
        Some(pid) => {
            debug!(pid = %pid, "process already gone");
        }
        None if tracked_pid == PID_UNKNOWN => {
            debug!("no handle and no tracked pid, nothing to kill");
        }
        None => {
            warn!(tracked_pid = %tracked_pid, "tracked pid out of range, nothing to kill");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;

    struct ScriptedProcess {
        pid: Option<u32>,
        alive: AtomicBool,
        dies_on_graceful: bool,
        terminations: AtomicU32,
    }

    impl ScriptedProcess {
        fn new(pid: Option<u32>, alive: bool, dies_on_graceful: bool) -> Self {
            Self {
                pid,
                alive: AtomicBool::new(alive),
                dies_on_graceful,
                terminations: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EngineProcess for ScriptedProcess {
        fn pid(&self) -> Option<u32> {
            self.pid
        }
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
        async fn terminate(&self, force: bool) -> io::Result<()> {
            self.terminations.fetch_add(1, Ordering::SeqCst);
            if force || self.dies_on_graceful {
                self.alive.store(false, Ordering::SeqCst);
            }
            Ok(())
        }
        async fn wait_exit(&self, _timeout: Duration) -> bool {
            !self.alive.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn graceful_path_suffices() {
        let proc = Arc::new(ScriptedProcess::new(Some(999_999), true, true));
        kill_process_safely(Some(proc.clone()), PID_UNKNOWN).await;
        assert_eq!(proc.terminations.load(Ordering::SeqCst), 1);
        assert!(!proc.is_alive());
    }

    #[tokio::test]
    async fn escalates_to_forced_kill() {
        let proc = Arc::new(ScriptedProcess::new(Some(999_999), true, false));
        kill_process_safely(Some(proc.clone()), PID_UNKNOWN).await;
        assert_eq!(proc.terminations.load(Ordering::SeqCst), 2);
        assert!(!proc.is_alive());
    }

    #[tokio::test]
    async fn idempotent_on_dead_process() {
        let proc = Arc::new(ScriptedProcess::new(Some(999_999), false, true));
        kill_process_safely(Some(proc.clone()), PID_UNKNOWN).await;
        kill_process_safely(Some(proc.clone()), PID_UNKNOWN).await;
        assert_eq!(proc.terminations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tolerates_missing_handle_and_pid() {
        kill_process_safely(None, PID_UNKNOWN).await;
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn pid_fallback_kills_real_process() {
        use tokio::process::Command;

        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("failed to spawn sleep");
        let pid = child.id().expect("no pid");

        // No handle available: must go through the pid fallback.
        kill_process_safely(None, i64::from(pid)).await;

        let _ = child.wait().await;
        assert!(!pid_exists(pid));
    }
}
