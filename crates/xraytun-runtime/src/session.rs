//! Session orchestration: commands in, lifecycle events out.
//!
//! The controller glues the process supervisor, tunnel manager and
//! watchdog together behind a small command surface. It owns session
//! status and is the only place that decides when the session as a
//! whole is up, degraded or finished.

use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use xraytun_core::commands::SessionCommand;
use xraytun_core::events::{SessionEvent, SessionMode, SessionStatus};
use xraytun_core::paths::AppPaths;
use xraytun_core::ports::{EngineLauncher, LogStore, PrefsSource, TunProvisioner, TunnelDriver};

use crate::monitor::{ConnectionMonitor, WATCHDOG_INTERVAL, WatchVerdict};
use crate::process::{LogPipe, ProcessSupervisor};
use crate::tunnel::TunnelManager;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 64;

/// Drives a whole session: engine process, optional tunnel, watchdog.
pub struct SessionController {
    prefs: Arc<dyn PrefsSource>,
    log_store: Arc<dyn LogStore>,
    supervisor: ProcessSupervisor,
    tunnel: TunnelManager,
    events: broadcast::Sender<SessionEvent>,
    status: Mutex<SessionStatus>,
    /// Mode the running session was started with.
    active_mode: Mutex<Option<SessionMode>>,
    monitor_cancel: Mutex<Option<CancellationToken>>,
    watchdog_interval: Mutex<std::time::Duration>,
}

impl SessionController {
    pub fn new(
        launcher: Arc<dyn EngineLauncher>,
        provisioner: Arc<dyn TunProvisioner>,
        driver: Arc<dyn TunnelDriver>,
        prefs: Arc<dyn PrefsSource>,
        log_store: Arc<dyn LogStore>,
        paths: AppPaths,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let log_pipe = LogPipe::new(log_store.clone(), events.clone());
        Arc::new(Self {
            prefs,
            log_store,
            supervisor: ProcessSupervisor::new(launcher, paths.clone(), log_pipe),
            tunnel: TunnelManager::new(provisioner, driver, paths),
            events,
            status: Mutex::new(SessionStatus::Stopped),
            active_mode: Mutex::new(None),
            monitor_cancel: Mutex::new(None),
            watchdog_interval: Mutex::new(WATCHDOG_INTERVAL),
        })
    }

    /// Override the watchdog interval before starting a session.
    pub fn set_watchdog_interval(&self, interval: std::time::Duration) {
        *self.watchdog_interval.lock().unwrap() = interval;
    }

    /// Subscribe to session lifecycle and log-batch events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Handle one session command.
    pub async fn dispatch(self: &Arc<Self>, command: SessionCommand) -> anyhow::Result<()> {
        match command {
            SessionCommand::Start => self.start().await,
            SessionCommand::Stop => self.stop().await,
            SessionCommand::Reload => self.reload().await,
        }
    }

    /// Bring the session up with a fresh preference snapshot.
    ///
    /// Any partial progress is rolled back on failure; the session
    /// never lingers half-started.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        match self.status() {
            SessionStatus::Starting | SessionStatus::Running => {
                bail!("session already running");
            }
            SessionStatus::Stopping => bail!("session still stopping"),
            SessionStatus::Stopped | SessionStatus::Failed => {}
        }
        self.set_status(SessionStatus::Starting);

        let prefs = self.prefs.snapshot();
        let mode = prefs.mode();
        info!(?mode, "starting session");

        // Each session starts with an empty log so the operator sees
        // only the current run.
        self.log_store.clear();

        // Interface first: a refused tunnel must not fork an engine
        // that would briefly run with no network path.
        if mode == SessionMode::Tunneled {
            if let Err(e) = self.tunnel.establish(&prefs).await {
                self.report_failure(&format!("tunnel establish failed: {e}"))
                    .await;
                return Err(e).context("tunnel establish failed");
            }
        }

        if let Err(e) = self.supervisor.start(&prefs).await {
            self.tunnel.teardown().await;
            self.report_failure(&format!("engine start failed: {e}"))
                .await;
            return Err(e).context("engine start failed");
        }

        *self.active_mode.lock().unwrap() = Some(mode);
        self.set_status(SessionStatus::Running);
        let _ = self.events.send(SessionEvent::started(mode));
        let interval = *self.watchdog_interval.lock().unwrap();
        self.spawn_monitor(interval);
        Ok(())
    }

    /// Tear the session down. Idempotent.
    pub async fn stop(self: &Arc<Self>) -> anyhow::Result<()> {
        if matches!(self.status(), SessionStatus::Stopped) {
            debug!("stop with no running session");
            return Ok(());
        }
        self.set_status(SessionStatus::Stopping);
        info!("stopping session");

        self.cancel_monitor();
        self.supervisor.stop().await;
        self.tunnel.teardown().await;

        *self.active_mode.lock().unwrap() = None;
        self.set_status(SessionStatus::Stopped);
        let _ = self.events.send(SessionEvent::stopped());
        Ok(())
    }

    /// Restart the engine with a fresh preference snapshot, keeping
    /// the tunnel interface up.
    pub async fn reload(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.status() != SessionStatus::Running {
            bail!("no running session to reload");
        }
        let prefs = self.prefs.snapshot();
        if let Err(e) = self.supervisor.reload(&prefs).await {
            self.cancel_monitor();
            self.tunnel.teardown().await;
            self.report_failure(&format!("reload failed: {e}")).await;
            return Err(e).context("reload failed");
        }
        info!("session reloaded");
        Ok(())
    }

    fn spawn_monitor(self: &Arc<Self>, interval: std::time::Duration) {
        let monitor = ConnectionMonitor::new(interval);
        let token = monitor.token();
        if let Some(old) = self.monitor_cancel.lock().unwrap().replace(token) {
            old.cancel();
        }
        let controller = self.clone();
        monitor.spawn(move || {
            let controller = controller.clone();
            async move { controller.watchdog_tick().await }
        });
    }

    fn cancel_monitor(&self) {
        if let Some(token) = self.monitor_cancel.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// One watchdog pass: verify the engine and, in tunneled mode, the
    /// interface descriptor; restore whichever silently failed.
    async fn watchdog_tick(self: Arc<Self>) -> WatchVerdict {
        if self.status() != SessionStatus::Running {
            return WatchVerdict::SessionStopped;
        }
        let mode = *self.active_mode.lock().unwrap();
        let mut restored = false;

        if !self.supervisor.is_running() {
            warn!("engine not running, restarting");
            let prefs = self.prefs.snapshot();
            // Clear out whatever dead record remains before starting.
            self.supervisor.stop().await;
            if let Err(e) = self.supervisor.start(&prefs).await {
                self.fail_session(&format!("engine restart failed: {e}"))
                    .await;
                return WatchVerdict::SessionStopped;
            }
            restored = true;
        }

        if mode == Some(SessionMode::Tunneled) && !self.tunnel.fd_valid().await {
            warn!("tunnel descriptor invalid, re-establishing");
            let prefs = self.prefs.snapshot();
            self.tunnel.teardown().await;
            if let Err(e) = self.tunnel.establish(&prefs).await {
                self.fail_session(&format!("tunnel re-establish failed: {e}"))
                    .await;
                return WatchVerdict::SessionStopped;
            }
            restored = true;
        }

        if restored {
            // Subscribers saw the session as up the whole time; tell
            // them it was silently replaced underneath.
            if let Some(mode) = mode {
                let _ = self.events.send(SessionEvent::resumed(mode));
            }
            WatchVerdict::Restored
        } else {
            WatchVerdict::Healthy
        }
    }

    /// Mark a failed start attempt; nothing of the session remains up.
    async fn report_failure(&self, reason: &str) {
        error!(reason, "session start failed");
        self.set_status(SessionStatus::Failed);
        let _ = self.events.send(SessionEvent::failed(reason));
    }

    /// Tear everything down after an unrecoverable mid-session fault.
    async fn fail_session(&self, reason: &str) {
        error!(reason, "session failed");
        self.supervisor.stop().await;
        self.tunnel.teardown().await;
        *self.active_mode.lock().unwrap() = None;
        self.set_status(SessionStatus::Failed);
        let _ = self.events.send(SessionEvent::failed(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::DuplexStream;

    use xraytun_core::ports::{
        EngineProcess, EngineSpawnSpec, ProcessError, SpawnedEngine, TunInterfaceSpec, TunnelError,
    };
    use xraytun_core::prefs::Preferences;

    struct FakeProcess {
        alive: AtomicBool,
        stdout_tx: Mutex<Option<DuplexStream>>,
    }

    #[async_trait]
    impl EngineProcess for FakeProcess {
        fn pid(&self) -> Option<u32> {
            None
        }
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
        async fn terminate(&self, _force: bool) -> io::Result<()> {
            self.alive.store(false, Ordering::SeqCst);
            drop(self.stdout_tx.lock().unwrap().take());
            Ok(())
        }
        async fn wait_exit(&self, _timeout: Duration) -> bool {
            !self.is_alive()
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        launches: AtomicU32,
        refuse: AtomicBool,
    }

    #[async_trait]
    impl EngineLauncher for FakeLauncher {
        async fn launch(&self, _spec: &EngineSpawnSpec) -> Result<SpawnedEngine, ProcessError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(ProcessError::SpawnFailed("refused".to_string()));
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            let (stdin_tx, _stdin_rx) = tokio::io::duplex(64 * 1024);
            let (stdout_tx, stdout_rx) = tokio::io::duplex(64 * 1024);
            Ok(SpawnedEngine {
                process: Arc::new(FakeProcess {
                    alive: AtomicBool::new(true),
                    stdout_tx: Mutex::new(Some(stdout_tx)),
                }),
                stdin: Box::new(stdin_tx),
                stdout: Box::new(stdout_rx),
                stderr: None,
            })
        }
    }

    #[derive(Default)]
    struct PipeProvisioner {
        refuse: AtomicBool,
    }
    impl TunProvisioner for PipeProvisioner {
        fn establish(
            &self,
            _spec: &TunInterfaceSpec,
        ) -> Result<std::os::fd::OwnedFd, TunnelError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(TunnelError::EstablishRefused("permission denied".into()));
            }
            let (read_end, _write_end) = nix::unistd::pipe()
                .map_err(|e| TunnelError::EstablishRefused(e.to_string()))?;
            Ok(read_end)
        }
    }

    #[derive(Default)]
    struct CountingDriver {
        starts: AtomicU32,
        stops: AtomicU32,
    }
    #[async_trait]
    impl TunnelDriver for CountingDriver {
        async fn start(
            &self,
            _config_path: &Path,
            _fd: std::os::fd::RawFd,
        ) -> Result<(), TunnelError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NullStore;
    impl LogStore for NullStore {
        fn append(&self, _line: &str) {}
        fn clear(&self) {}
    }

    struct Rig {
        controller: Arc<SessionController>,
        launcher: Arc<FakeLauncher>,
        provisioner: Arc<PipeProvisioner>,
        driver: Arc<CountingDriver>,
    }

    fn rig(dir: &tempfile::TempDir, vpn_enabled: bool) -> Rig {
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"inbounds":[{"port":10808}]}"#).unwrap();
        let prefs = Preferences {
            selected_config: Some(config),
            vpn_enabled,
            ..Preferences::default()
        };
        let launcher = Arc::new(FakeLauncher::default());
        let provisioner = Arc::new(PipeProvisioner::default());
        let driver = Arc::new(CountingDriver::default());
        let paths = AppPaths::new(dir.path(), dir.path(), dir.path().join("engine"));
        let controller = SessionController::new(
            launcher.clone(),
            provisioner.clone(),
            driver.clone(),
            Arc::new(prefs),
            Arc::new(NullStore),
            paths,
        );
        Rig {
            controller,
            launcher,
            provisioner,
            driver,
        }
    }

    #[tokio::test]
    async fn start_and_stop_tunneled_session() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, true);
        let mut events = rig.controller.subscribe();

        rig.controller.dispatch(SessionCommand::Start).await.unwrap();
        assert_eq!(rig.controller.status(), SessionStatus::Running);
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Started {
                mode: SessionMode::Tunneled,
                ..
            }
        ));

        rig.controller.dispatch(SessionCommand::Stop).await.unwrap();
        assert_eq!(rig.controller.status(), SessionStatus::Stopped);
        assert_eq!(rig.launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(rig.driver.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn engine_only_session_skips_tunnel() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, false);
        let mut events = rig.controller.subscribe();

        rig.controller.start().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Started {
                mode: SessionMode::EngineOnly,
                ..
            }
        ));
        assert_eq!(rig.driver.starts.load(Ordering::SeqCst), 0);
        rig.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, false);
        rig.controller.start().await.unwrap();
        assert!(rig.controller.start().await.is_err());
        assert_eq!(rig.controller.status(), SessionStatus::Running);
        rig.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_session_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, false);
        rig.controller.stop().await.unwrap();
        assert_eq!(rig.controller.status(), SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn failed_start_reports_and_allows_retry() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, false);
        let mut events = rig.controller.subscribe();

        rig.launcher.refuse.store(true, Ordering::SeqCst);
        assert!(rig.controller.start().await.is_err());
        assert_eq!(rig.controller.status(), SessionStatus::Failed);
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Failed { .. }
        ));

        rig.launcher.refuse.store(false, Ordering::SeqCst);
        rig.controller.start().await.unwrap();
        assert_eq!(rig.controller.status(), SessionStatus::Running);
        rig.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn refused_interface_prevents_engine_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, true);
        rig.provisioner.refuse.store(true, Ordering::SeqCst);

        assert!(rig.controller.start().await.is_err());
        assert_eq!(rig.controller.status(), SessionStatus::Failed);
        // The interface comes first; its refusal must not fork an
        // engine at all.
        assert_eq!(rig.launcher.launches.load(Ordering::SeqCst), 0);
        assert_eq!(rig.driver.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn engine_failure_rolls_back_established_tunnel() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, true);
        rig.launcher.refuse.store(true, Ordering::SeqCst);

        assert!(rig.controller.start().await.is_err());
        assert_eq!(rig.controller.status(), SessionStatus::Failed);
        assert_eq!(rig.driver.starts.load(Ordering::SeqCst), 1);
        assert_eq!(rig.driver.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reload_requires_running_session() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, false);
        assert!(rig.controller.reload().await.is_err());
    }

    #[tokio::test]
    async fn reload_restarts_engine_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(&dir, false);
        rig.controller.start().await.unwrap();
        rig.controller
            .dispatch(SessionCommand::Reload)
            .await
            .unwrap();
        assert_eq!(rig.controller.status(), SessionStatus::Running);
        assert_eq!(rig.launcher.launches.load(Ordering::SeqCst), 2);
        rig.controller.stop().await.unwrap();
    }
}
