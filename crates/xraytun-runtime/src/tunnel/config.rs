//! Tunnel driver configuration and interface spec construction.

use xraytun_core::ports::{TunAddress, TunInterfaceSpec};
use xraytun_core::prefs::Preferences;

/// Private subnets kept off the tunnel when bypass-LAN is set.
const LAN_SUBNETS: [(&str, u8); 3] = [
    ("10.0.0.0", 8),
    ("172.16.0.0", 12),
    ("192.168.0.0", 16),
];

/// Render the key-value config consumed by the native tunnel driver.
///
/// Credentials are emitted only when both username and password are
/// set.
pub fn render_tproxy_conf(prefs: &Preferences) -> String {
    let mut conf = format!(
        "misc:\n  task-stack-size: {}\ntunnel:\n  mtu: {}\n",
        prefs.task_stack_size, prefs.tunnel_mtu
    );
    conf.push_str(&format!(
        "socks5:\n  port: {}\n  address: '{}'\n  udp: '{}'\n",
        prefs.socks_port,
        prefs.socks_address,
        if prefs.udp_in_tcp { "tcp" } else { "udp" }
    ));
    if !prefs.socks_username.is_empty() && !prefs.socks_password.is_empty() {
        conf.push_str(&format!("  username: '{}'\n", prefs.socks_username));
        conf.push_str(&format!("  password: '{}'\n", prefs.socks_password));
    }
    conf
}

/// Build the virtual interface description from preferences.
pub fn build_interface_spec(prefs: &Preferences) -> TunInterfaceSpec {
    let mut spec = TunInterfaceSpec {
        mtu: prefs.tunnel_mtu,
        ..TunInterfaceSpec::default()
    };
    let mut session = String::new();

    if prefs.ipv4_enabled {
        spec.ipv4 = Some(TunAddress {
            address: prefs.tunnel_ipv4_address.clone(),
            prefix: prefs.tunnel_ipv4_prefix,
            dns: non_empty(&prefs.dns_ipv4),
        });
        spec.routes.push(("0.0.0.0".to_string(), 0));
        session.push_str("IPv4");
    }

    if prefs.ipv6_enabled {
        spec.ipv6 = Some(TunAddress {
            address: prefs.tunnel_ipv6_address.clone(),
            prefix: prefs.tunnel_ipv6_prefix,
            dns: non_empty(&prefs.dns_ipv6),
        });
        spec.routes.push(("::".to_string(), 0));
        if !session.is_empty() {
            session.push_str(" + ");
        }
        session.push_str("IPv6");
    }

    if prefs.bypass_lan {
        spec.excluded_routes = LAN_SUBNETS
            .iter()
            .map(|(addr, prefix)| ((*addr).to_string(), *prefix))
            .collect();
    }

    if prefs.http_proxy_enabled {
        spec.http_proxy = Some(("127.0.0.1".to_string(), prefs.http_proxy_port));
    }

    if prefs.global {
        session.push_str("/Global");
    } else {
        spec.allowed_apps = prefs.apps.clone();
        session.push_str("/per-App");
    }
    // Keep the client's own control traffic out of the tunnel it
    // creates, unless a per-app allow list already scopes routing.
    if spec.allowed_apps.is_empty() {
        spec.disallowed_apps = vec![prefs.own_package.clone()];
    }

    spec.session = session;
    spec
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
