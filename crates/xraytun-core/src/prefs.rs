//! Preference snapshot driving a session.
//!
//! Persistence and editing live in the host layer; the runtime only
//! ever sees an immutable snapshot taken when a command arrives.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::events::SessionMode;

/// Immutable snapshot of the user's session preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Selected engine configuration file, if any.
    pub selected_config: Option<PathBuf>,

    /// Run the engine without a virtual interface when false.
    pub vpn_enabled: bool,

    /// Stack size handed to the native tunnel's worker tasks.
    pub task_stack_size: u32,
    /// MTU of the virtual interface.
    pub tunnel_mtu: u16,

    /// Local SOCKS5 endpoint the tunnel forwards into.
    pub socks_address: String,
    pub socks_port: u16,
    pub socks_username: String,
    pub socks_password: String,
    /// Encapsulate UDP in TCP on the SOCKS5 leg.
    pub udp_in_tcp: bool,

    /// Keep private subnets off the tunnel.
    pub bypass_lan: bool,

    /// Advertise an embedded HTTP proxy on the interface.
    pub http_proxy_enabled: bool,
    pub http_proxy_port: u16,

    pub ipv4_enabled: bool,
    pub tunnel_ipv4_address: String,
    pub tunnel_ipv4_prefix: u8,
    pub dns_ipv4: String,

    pub ipv6_enabled: bool,
    pub tunnel_ipv6_address: String,
    pub tunnel_ipv6_prefix: u8,
    pub dns_ipv6: String,

    /// Route all apps when true; otherwise only `apps`.
    pub global: bool,
    /// Per-app allow list (package names).
    pub apps: Vec<String>,

    /// The client's own package name, excluded from the tunnel when no
    /// per-app list applies.
    pub own_package: String,
}

impl Preferences {
    /// Session mode implied by this snapshot.
    pub fn mode(&self) -> SessionMode {
        if self.vpn_enabled {
            SessionMode::Tunneled
        } else {
            SessionMode::EngineOnly
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            selected_config: None,
            vpn_enabled: true,
            task_stack_size: 81920,
            tunnel_mtu: 8500,
            socks_address: "127.0.0.1".to_string(),
            socks_port: 10808,
            socks_username: String::new(),
            socks_password: String::new(),
            udp_in_tcp: false,
            bypass_lan: false,
            http_proxy_enabled: false,
            http_proxy_port: 10809,
            ipv4_enabled: true,
            tunnel_ipv4_address: "198.18.0.1".to_string(),
            tunnel_ipv4_prefix: 32,
            dns_ipv4: "1.1.1.1".to_string(),
            ipv6_enabled: false,
            tunnel_ipv6_address: "fc00::1".to_string(),
            tunnel_ipv6_prefix: 128,
            dns_ipv6: String::new(),
            global: true,
            apps: Vec::new(),
            own_package: "com.xraytun.app".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_tunneled() {
        assert_eq!(Preferences::default().mode(), SessionMode::Tunneled);
    }

    #[test]
    fn engine_only_when_vpn_disabled() {
        let prefs = Preferences {
            vpn_enabled: false,
            ..Preferences::default()
        };
        assert_eq!(prefs.mode(), SessionMode::EngineOnly);
    }
}
