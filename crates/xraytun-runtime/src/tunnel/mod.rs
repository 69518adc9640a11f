//! Virtual interface lifecycle and native driver invocation.

mod config;

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use xraytun_core::paths::AppPaths;
use xraytun_core::ports::{TunProvisioner, TunnelDriver, TunnelError};
use xraytun_core::prefs::Preferences;

pub use config::{build_interface_spec, render_tproxy_conf};

/// Owns the tunnel interface descriptor and drives the native
/// packet-forwarding library.
///
/// Exactly one interface may be open at a time; only this type ever
/// creates or closes the descriptor.
pub struct TunnelManager {
    provisioner: Arc<dyn TunProvisioner>,
    driver: Arc<dyn TunnelDriver>,
    paths: AppPaths,
    active: Mutex<Option<OwnedFd>>,
}

impl TunnelManager {
    pub fn new(
        provisioner: Arc<dyn TunProvisioner>,
        driver: Arc<dyn TunnelDriver>,
        paths: AppPaths,
    ) -> Self {
        Self {
            provisioner,
            driver,
            paths,
            active: Mutex::new(None),
        }
    }

    /// Establish the interface and start the native driver.
    ///
    /// Any failure releases everything acquired so far before
    /// returning; the caller is expected to stop the whole session
    /// rather than run the engine with no working network path.
    pub async fn establish(&self, prefs: &Preferences) -> Result<(), TunnelError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("tunnel already established");
            return Ok(());
        }

        let spec = build_interface_spec(prefs);
        debug!(session = %spec.session, mtu = spec.mtu, "establishing tunnel interface");
        let fd = self.provisioner.establish(&spec)?;

        let config_path = self.paths.tunnel_config_path();
        if let Err(e) = tokio::fs::write(&config_path, render_tproxy_conf(prefs)).await {
            // fd drops here, closing the interface.
            return Err(TunnelError::ConfigWrite(e));
        }

        self.driver.start(&config_path, fd.as_raw_fd()).await?;
        *active = Some(fd);
        Ok(())
    }

    /// Stop the driver and close the descriptor.
    ///
    /// Idempotent: does nothing when no interface is open, and close
    /// errors on an already-closed descriptor are ignored.
    pub async fn teardown(&self) {
        let mut active = self.active.lock().await;
        if let Some(fd) = active.take() {
            debug!("tearing down tunnel interface");
            self.driver.stop().await;
            // Dropping the OwnedFd closes it; a failed close at this
            // point is not actionable.
            drop(fd);
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Whether the interface descriptor is present and still valid.
    pub async fn fd_valid(&self) -> bool {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(fd) => fd_is_open(fd),
            None => false,
        }
    }
}

#[cfg(unix)]
fn fd_is_open(fd: &OwnedFd) -> bool {
    use std::os::fd::AsFd;
    match nix::fcntl::fcntl(fd.as_fd(), nix::fcntl::FcntlArg::F_GETFD) {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "tunnel descriptor no longer valid");
            false
        }
    }
}

#[cfg(not(unix))]
fn fd_is_open(_fd: &OwnedFd) -> bool {
    false
}
