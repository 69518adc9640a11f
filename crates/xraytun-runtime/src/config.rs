//! Engine configuration loading and control-port injection.
//!
//! The selected JSON configuration is size-capped before being read
//! into memory, scanned for the ports it already references (so the
//! allocated control port cannot collide with them), augmented with a
//! stats service block, and finally fed to the engine over stdin.

use std::collections::HashSet;
use std::path::Path;

use serde_json::{Value, json};
use tracing::debug;
use xraytun_core::ports::ConfigError;

/// Hard cap on configuration size read into memory.
pub const MAX_CONFIG_BYTES: u64 = 10 * 1024 * 1024;

/// A validated engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    value: Value,
}

impl EngineConfig {
    /// Load and validate the configuration at `path`.
    ///
    /// Rejects missing files and anything over [`MAX_CONFIG_BYTES`]
    /// before reading, bounding memory use and rejecting corrupted
    /// input.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let size = std::fs::metadata(path)?.len();
        if size > MAX_CONFIG_BYTES {
            return Err(ConfigError::TooLarge {
                size,
                limit: MAX_CONFIG_BYTES,
            });
        }
        let bytes = std::fs::read(path)?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        debug!(path = %path.display(), size = %size, "loaded engine configuration");
        Ok(Self { value })
    }

    /// Every port the configuration already references.
    ///
    /// Walks the whole document collecting values under "port"-like
    /// keys (numeric or numeric-string) and the port suffix of
    /// "listen" addresses; the allocated control port must stay
    /// outside this set.
    pub fn referenced_ports(&self) -> HashSet<u16> {
        let mut ports = HashSet::new();
        collect_ports(&self.value, &mut ports);
        ports
    }

    /// Inject the stats/control service block listening on `port`.
    pub fn inject_stats_service(&mut self, port: u16) {
        if let Value::Object(root) = &mut self.value {
            root.insert("stats".to_string(), json!({}));
            root.insert(
                "api".to_string(),
                json!({
                    "tag": "api",
                    "listen": format!("127.0.0.1:{port}"),
                    "services": ["StatsService"],
                }),
            );
        }
    }

    /// Serialized bytes written to the engine's stdin.
    pub fn to_bytes(&self) -> Vec<u8> {
        // The value came from serde_json, so this cannot fail.
        serde_json::to_vec(&self.value).unwrap_or_default()
    }
}

fn collect_ports(value: &Value, ports: &mut HashSet<u16>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if is_port_key(key) {
                    if let Some(port) = value_as_port(child) {
                        ports.insert(port);
                    }
                } else if key == "listen" {
                    if let Some(port) = child.as_str().and_then(listen_port) {
                        ports.insert(port);
                    }
                }
                collect_ports(child, ports);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_ports(item, ports);
            }
        }
        _ => {}
    }
}

fn is_port_key(key: &str) -> bool {
    key == "port" || key.ends_with("_port") || key.ends_with("Port")
}

/// Ports appear both as numbers and as numeric strings.
fn value_as_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Port suffix of a "host:port" listen address, if it has one.
fn listen_port(address: &str) -> Option<u16> {
    address.rsplit(':').next().and_then(|p| p.parse().ok())
}
