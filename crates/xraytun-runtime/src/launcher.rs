//! Engine launcher backed by `tokio::process`.

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use std::sync::Arc;
use xraytun_core::ports::{EngineLauncher, EngineProcess, EngineSpawnSpec, ProcessError, SpawnedEngine};

/// Launches the bundled engine binary with piped stdio and the
/// restricted environment from the spawn spec.
#[derive(Debug, Default)]
pub struct TokioEngineLauncher;

impl TokioEngineLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineLauncher for TokioEngineLauncher {
    async fn launch(&self, spec: &EngineSpawnSpec) -> Result<SpawnedEngine, ProcessError> {
        if !spec.binary.exists() {
            return Err(ProcessError::SpawnFailed(format!(
                "engine binary not found: {}",
                spec.binary.display()
            )));
        }

        let mut cmd = Command::new(&spec.binary);
        cmd.current_dir(&spec.working_dir)
            .envs(spec.env.iter().cloned())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        // Best-effort: a missing pid is tolerated, not fatal.
        let pid = child.id();
        if pid.is_none() {
            warn!("spawned engine without a visible pid");
        }
        debug!(pid = ?pid, binary = %spec.binary.display(), "engine spawned");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProcessError::SpawnFailed("engine stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::SpawnFailed("engine stdout not piped".to_string()))?;
        let stderr = child.stderr.take();

        Ok(SpawnedEngine {
            process: Arc::new(TokioEngineProcess {
                pid,
                child: Mutex::new(child),
            }),
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: stderr.map(|s| Box::new(s) as _),
        })
    }
}

/// Capability handle over a `tokio::process::Child`.
///
/// The pid is captured at spawn so termination stays possible even if
/// the child handle stops cooperating.
struct TokioEngineProcess {
    pid: Option<u32>,
    child: Mutex<Child>,
}

impl TokioEngineProcess {
    /// Non-blocking exit probe; treats probe errors as "exited".
    fn probe_exited(&self) -> bool {
        match self.child.lock().unwrap().try_wait() {
            Ok(None) => false,
            Ok(Some(_)) => true,
            Err(e) => {
                debug!(error = %e, "try_wait failed, assuming exited");
                true
            }
        }
    }
}

#[async_trait]
impl EngineProcess for TokioEngineProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&self) -> bool {
        !self.probe_exited()
    }

    async fn terminate(&self, force: bool) -> io::Result<()> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            let sig = if force { Signal::SIGKILL } else { Signal::SIGTERM };
            return match signal::kill(Pid::from_raw(pid as i32), sig) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(io::Error::other(e)),
            };
        }

        // No pid (or non-unix): the handle's kill is all we have.
        let mut child = self.child.lock().unwrap();
        match child.start_kill() {
            Ok(()) => Ok(()),
            // Already reaped counts as success.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn wait_exit(&self, timeout: Duration) -> bool {
        let step = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        loop {
            if self.probe_exited() {
                return true;
            }
            if waited >= timeout {
                return false;
            }
            sleep(step).await;
            waited += step;
        }
    }
}
