//! Local control-port allocation for the engine's stats endpoint.
//!
//! An allocated port is a hint, not a reservation: unrelated processes
//! can grab it between the probe and the engine binding it, so callers
//! must tolerate a later bind failure.

use std::collections::{HashMap, HashSet};
use std::net::TcpListener;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;
use xraytun_core::ports::ProcessError;

/// How long a verified-free port stays in the cache.
const CACHE_TTL: Duration = Duration::from_secs(30);
/// Random probes before falling back to an OS-assigned port.
const SAMPLE_ATTEMPTS: usize = 1000;
/// Ephemeral range sampled for candidates.
const EPHEMERAL_RANGE: std::ops::RangeInclusive<u16> = 49152..=65535;
/// OS-assigned fallback retries when the result lands in the
/// exclusion set.
const FALLBACK_ATTEMPTS: usize = 64;

/// Check if a port is bindable on the loopback interface.
/// Binds and immediately drops the listener, which releases the port.
fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port))
        .map(|listener| listener.local_addr().is_ok())
        .unwrap_or(false)
}

/// Finds a free local TCP port outside a caller-supplied exclusion
/// set, caching verified-free ports briefly.
#[derive(Debug, Default)]
pub struct PortAllocator {
    /// Verified-free ports and when they were verified. Hints only;
    /// every hit is re-probed before use. The bind probe itself runs
    /// outside this lock.
    cache: Mutex<HashMap<u16, Instant>>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a bindable port not present in `excluded`.
    ///
    /// Tries the cache, then bounded random sampling of the ephemeral
    /// range, then an OS-assigned port. Never returns a port in
    /// `excluded` and never blocks indefinitely.
    pub fn find_port(&self, excluded: &HashSet<u16>) -> Result<u16, ProcessError> {
        if let Some(port) = self.cached_candidate(excluded) {
            debug!(port = %port, "allocated port from cache");
            return Ok(port);
        }

        for _ in 0..SAMPLE_ATTEMPTS {
            let port = fastrand::u16(EPHEMERAL_RANGE);
            if excluded.contains(&port) {
                continue;
            }
            if is_port_available(port) {
                self.remember(port);
                debug!(port = %port, "allocated port by sampling");
                return Ok(port);
            }
        }

        self.os_assigned(excluded)
    }

    /// Probe cached ports outside the exclusion set, dropping entries
    /// that expired or no longer bind.
    fn cached_candidate(&self, excluded: &HashSet<u16>) -> Option<u16> {
        let candidates: Vec<u16> = {
            let mut cache = self.cache.lock().unwrap();
            cache.retain(|_, verified_at| verified_at.elapsed() < CACHE_TTL);
            cache
                .keys()
                .copied()
                .filter(|port| !excluded.contains(port))
                .collect()
        };

        for port in candidates {
            if is_port_available(port) {
                return Some(port);
            }
            // Taken by someone else since verification.
            self.cache.lock().unwrap().remove(&port);
        }
        None
    }

    fn remember(&self, port: u16) {
        self.cache.lock().unwrap().insert(port, Instant::now());
    }

    /// Bind to port 0 and take whatever the OS hands back.
    fn os_assigned(&self, excluded: &HashSet<u16>) -> Result<u16, ProcessError> {
        for _ in 0..FALLBACK_ATTEMPTS {
            let listener = TcpListener::bind(("127.0.0.1", 0))?;
            let port = listener.local_addr()?.port();
            drop(listener);
            if !excluded.contains(&port) {
                self.remember(port);
                debug!(port = %port, "allocated OS-assigned port");
                return Ok(port);
            }
        }
        Err(ProcessError::PortExhausted(format!(
            "OS kept assigning excluded ports after {FALLBACK_ATTEMPTS} attempts"
        )))
    }
}
