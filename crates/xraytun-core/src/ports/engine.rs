//! Engine process launcher and capability handle.
//!
//! The engine is launched with piped stdin (the configuration is fed
//! through it and the stream closed) and piped output. The returned
//! handle deliberately exposes only the operations the supervisor
//! needs: pid lookup, liveness, termination, and a bounded exit wait.
//! The handle may become unusable across host lifecycle transitions
//! while the OS process persists, which is why the supervisor tracks
//! the pid separately and never relies on the handle alone for
//! termination.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::ProcessError;

/// Capability handle to a spawned engine process.
#[async_trait]
pub trait EngineProcess: Send + Sync {
    /// OS process identifier, if one could be captured at spawn.
    fn pid(&self) -> Option<u32>;

    /// Whether the process has not yet been observed to exit.
    fn is_alive(&self) -> bool;

    /// Request termination. `force` escalates to an unconditional kill.
    async fn terminate(&self, force: bool) -> io::Result<()>;

    /// Wait up to `timeout` for the process to exit.
    ///
    /// Returns `true` if the process was observed dead within the
    /// bound, `false` if it was still alive when the timeout elapsed.
    async fn wait_exit(&self, timeout: Duration) -> bool;
}

/// Everything the supervisor receives from a successful spawn.
pub struct SpawnedEngine {
    /// Capability handle, shared with the state cell and kill path.
    pub process: Arc<dyn EngineProcess>,
    /// Engine stdin; the configuration is written here then dropped.
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    /// Engine stdout; read to EOF by the supervisor's read loop.
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Engine stderr when the launcher could not merge it into stdout.
    pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
}

/// How to spawn the engine binary.
#[derive(Debug, Clone)]
pub struct EngineSpawnSpec {
    /// Path to the engine binary.
    pub binary: PathBuf,
    /// Working directory (the app-private files directory).
    pub working_dir: PathBuf,
    /// Environment restricted to app-private paths.
    pub env: Vec<(String, String)>,
}

/// Launches the engine binary.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self, spec: &EngineSpawnSpec) -> Result<SpawnedEngine, ProcessError>;
}
