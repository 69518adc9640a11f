//! Engine process lifecycle: start, reload, stop, exit handling.
//!
//! One supervisor owns at most one engine generation at a time. Every
//! spawned generation gets its own read loop that drains engine output
//! to EOF; EOF is the exit signal, and the read loop retires its own
//! generation through an identity-checked state clear so a slow old
//! loop can never clobber a newer generation. Recovery after an
//! unexpected exit is not done here; the watchdog owns restart policy.

use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use xraytun_core::paths::AppPaths;
use xraytun_core::ports::{ConfigError, EngineLauncher, EngineSpawnSpec, ProcessError};
use xraytun_core::prefs::Preferences;

use crate::config::EngineConfig;
use crate::ports_alloc::PortAllocator;

use super::liveness::CachedLiveness;
use super::logs::LogPipe;
use super::shutdown::kill_process_safely;
use super::state::{ProcessState, StateCell};

/// Supervises the engine subprocess for one session.
pub struct ProcessSupervisor {
    launcher: Arc<dyn EngineLauncher>,
    paths: AppPaths,
    allocator: PortAllocator,
    state: Arc<StateCell>,
    log_pipe: LogPipe,
    liveness: CachedLiveness,
    /// Serializes start/reload/stop so the no-live-process check and
    /// the spawn it guards are one atomic step. Exit handlers stay
    /// outside this lock; they are identity-guarded instead.
    lifecycle: tokio::sync::Mutex<()>,
    /// Cancels the current generation's read loops on stop.
    read_cancel: Mutex<Option<CancellationToken>>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn EngineLauncher>, paths: AppPaths, log_pipe: LogPipe) -> Self {
        Self {
            launcher,
            paths,
            allocator: PortAllocator::new(),
            state: Arc::new(StateCell::new()),
            log_pipe,
            liveness: CachedLiveness::new(),
            lifecycle: tokio::sync::Mutex::new(()),
            read_cancel: Mutex::new(None),
        }
    }

    /// Start a new engine generation from the selected configuration.
    ///
    /// Rejected while a generation is already running, except during a
    /// reload, where the fresh generation supersedes the retiring one.
    /// The configuration is validated, given a free control port for
    /// its stats service, fed to the engine over stdin, and the stream
    /// closed.
    pub async fn start(&self, prefs: &Preferences) -> Result<(), ProcessError> {
        let _guard = self.lifecycle.lock().await;
        let current = self.state.load();
        if current.has_process() && !current.reloading {
            return Err(ProcessError::AlreadyRunning);
        }
        self.start_locked(prefs).await
    }

    /// Spawn a new generation. Caller holds the lifecycle lock and has
    /// verified no live non-reloading generation exists.
    async fn start_locked(&self, prefs: &Preferences) -> Result<(), ProcessError> {
        let config_path = prefs
            .selected_config
            .as_deref()
            .ok_or(ConfigError::NotSelected)?;
        let mut config = EngineConfig::load(config_path)?;
        let control_port = self.allocator.find_port(&config.referenced_ports())?;
        config.inject_stats_service(control_port);

        let spec = EngineSpawnSpec {
            binary: self.paths.engine_binary.clone(),
            working_dir: self.paths.files_dir.clone(),
            env: self.paths.engine_env(),
        };
        let spawned = self.launcher.launch(&spec).await?;
        let process = spawned.process.clone();
        let pid = process.pid();

        let replaced = self.state.publish(process.clone(), pid);
        if replaced.has_process() {
            debug!(old_pid = replaced.pid, "previous generation superseded");
        }

        let cancel = CancellationToken::new();
        let old_cancel = self.read_cancel.lock().unwrap().replace(cancel.clone());
        if let Some(old) = old_cancel {
            old.cancel();
        }

        // The engine reads its whole configuration from stdin and
        // starts once the stream closes. A failed write is not fatal
        // here: the engine will exit on its own and the read loop
        // reports that.
        let mut stdin = spawned.stdin;
        if let Err(e) = stdin.write_all(&config.to_bytes()).await {
            warn!(error = %e, "failed to write configuration to engine stdin");
        }
        if let Err(e) = stdin.shutdown().await {
            debug!(error = %e, "engine stdin shutdown failed");
        }
        drop(stdin);

        if let Some(stderr) = spawned.stderr {
            let pipe = self.log_pipe.clone();
            let stderr_cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = pipe.drain(stderr) => {}
                    () = stderr_cancel.cancelled() => {}
                }
            });
        }

        let pipe = self.log_pipe.clone();
        let state = self.state.clone();
        let stdout = spawned.stdout;
        tokio::spawn(async move {
            tokio::select! {
                () = pipe.drain(stdout) => {
                    // EOF: this generation's engine is gone. Retire it
                    // only if it is still the current generation.
                    match state.clear_if_current(&process) {
                        None => debug!(pid = ?pid, "stale generation exit"),
                        Some(true) => debug!(pid = ?pid, "engine exited for reload"),
                        Some(false) => {
                            warn!(pid = ?pid, "engine exited unexpectedly");
                            pipe.flush_now();
                        }
                    }
                }
                () = cancel.cancelled() => {
                    debug!(pid = ?pid, "read loop cancelled");
                }
            }
        });

        info!(pid = ?pid, control_port, "engine started");
        Ok(())
    }

    /// Replace the running generation with a fresh one.
    ///
    /// Marks the state as reloading first so the retiring generation's
    /// exit is treated as expected, then terminates it and starts anew
    /// with the current preferences.
    pub async fn reload(&self, prefs: &Preferences) -> Result<(), ProcessError> {
        let _guard = self.lifecycle.lock().await;
        if !self.state.load().has_process() {
            return Err(ProcessError::NotRunning);
        }
        let prior = self.state.mark_reloading();
        info!(pid = prior.pid, "reloading engine");
        kill_process_safely(prior.process, prior.pid).await;
        self.start_locked(prefs).await
    }

    /// Terminate the current generation and flush pending log output.
    ///
    /// Idempotent: stopping with nothing running does nothing harmful.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        let state = self.state.take();
        if state.has_process() {
            info!(pid = state.pid, "stopping engine");
        }
        kill_process_safely(state.process, state.pid).await;

        let cancel = self.read_cancel.lock().unwrap().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.log_pipe.flush_now();
    }

    /// Whether an engine process is currently alive.
    ///
    /// Prefers the handle's own view; falls back to a pid probe when
    /// the handle is gone or claims the process dead while a tracked
    /// pid remains.
    pub fn is_running(&self) -> bool {
        let state = self.state.load();
        if let Some(process) = &state.process {
            if process.is_alive() {
                return true;
            }
        }
        match u32::try_from(state.pid) {
            Ok(pid) if pid > 0 => self.liveness.is_alive(pid),
            _ => false,
        }
    }

    /// Snapshot of the current generation record.
    pub fn state(&self) -> ProcessState {
        self.state.load()
    }
}
