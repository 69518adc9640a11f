//! Pid liveness probe with a short result cache.
//!
//! The watchdog can query liveness in quick succession; caching the
//! answer for about a second keeps the syscall rate bounded.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::shutdown::pid_exists;

const CACHE_TTL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct CachedProbe {
    pid: u32,
    alive: bool,
    checked_at: Instant,
}

/// Liveness checker caching the last probe per pid.
#[derive(Debug, Default)]
pub struct CachedLiveness {
    last: Mutex<Option<CachedProbe>>,
}

impl CachedLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `pid` is alive, answered from cache when fresh.
    pub fn is_alive(&self, pid: u32) -> bool {
        let mut guard = self.last.lock().unwrap();
        if let Some(probe) = guard.as_ref() {
            if probe.pid == pid && probe.checked_at.elapsed() < CACHE_TTL {
                return probe.alive;
            }
        }
        let alive = pid_exists(pid);
        *guard = Some(CachedProbe {
            pid,
            alive,
            checked_at: Instant::now(),
        });
        alive
    }
}
