//! Tunnel provisioning and native driver boundaries.

use std::os::fd::{OwnedFd, RawFd};
use std::path::Path;

use async_trait::async_trait;

use super::TunnelError;

/// One address family's configuration on the virtual interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunAddress {
    /// Interface address, e.g. "198.18.0.1" or "fc00::1".
    pub address: String,
    /// Prefix length of the interface address.
    pub prefix: u8,
    /// Optional DNS server for this family.
    pub dns: Option<String>,
}

/// Declarative description of the virtual network interface.
///
/// Built by the tunnel manager from preferences and handed to the
/// provisioner, which on Android maps it onto `VpnService.Builder`.
#[derive(Debug, Clone, Default)]
pub struct TunInterfaceSpec {
    pub mtu: u16,
    /// Human-readable session label, e.g. "IPv4 + IPv6/Global".
    pub session: String,
    pub ipv4: Option<TunAddress>,
    pub ipv6: Option<TunAddress>,
    /// Routes as (address, prefix) pairs.
    pub routes: Vec<(String, u8)>,
    /// Subnets kept off the tunnel, e.g. private ranges when
    /// bypass-LAN is set.
    pub excluded_routes: Vec<(String, u8)>,
    /// Embedded HTTP proxy advertisement as (host, port).
    pub http_proxy: Option<(String, u16)>,
    /// Packages routed through the tunnel; empty means all.
    pub allowed_apps: Vec<String>,
    /// Packages excluded from the tunnel.
    pub disallowed_apps: Vec<String>,
}

/// Creates the virtual interface and hands over its file descriptor.
///
/// The returned fd is single-owner: only the tunnel manager closes it.
pub trait TunProvisioner: Send + Sync {
    fn establish(&self, spec: &TunInterfaceSpec) -> Result<OwnedFd, TunnelError>;
}

/// Start/stop boundary of the native packet-forwarding library.
#[async_trait]
pub trait TunnelDriver: Send + Sync {
    /// Start forwarding packets from `fd` to the local SOCKS5 endpoint
    /// described by the key-value file at `config_path`.
    async fn start(&self, config_path: &Path, fd: RawFd) -> Result<(), TunnelError>;

    /// Stop forwarding. Must tolerate being called when not started.
    async fn stop(&self);
}
