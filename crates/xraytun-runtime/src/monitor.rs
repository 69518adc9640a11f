//! Periodic watchdog scheduling.
//!
//! The monitor only owns the cadence and cancellation; what a tick
//! actually checks (process liveness, tunnel descriptor validity) is
//! supplied by the session layer, which keeps this reusable and easy
//! to test.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default interval between watchdog ticks.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome of one watchdog tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchVerdict {
    /// Process and tunnel both look healthy.
    Healthy,
    /// Something had silently failed and was brought back.
    Restored,
    /// The session is no longer wanted; stop monitoring.
    SessionStopped,
}

/// Fixed-interval watchdog over a session.
pub struct ConnectionMonitor {
    interval: Duration,
    cancel: CancellationToken,
}

impl ConnectionMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the monitor when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `tick` on every interval until cancellation or until a tick
    /// reports the session stopped.
    pub fn spawn<F, Fut>(self, tick: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = WatchVerdict> + Send,
    {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of a tokio interval fires immediately;
            // consume it so the watchdog starts one full period after
            // session start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match tick().await {
                            WatchVerdict::Healthy => {}
                            WatchVerdict::Restored => {
                                debug!("watchdog restored the session");
                            }
                            WatchVerdict::SessionStopped => {
                                debug!("watchdog found session stopped, exiting");
                                break;
                            }
                        }
                    }
                    () = self.cancel.cancelled() => {
                        debug!("watchdog cancelled");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn ticks_until_cancelled() {
        let monitor = ConnectionMonitor::new(Duration::from_millis(10));
        let token = monitor.token();
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();

        let handle = monitor.spawn(move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                WatchVerdict::Healthy
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn stops_when_session_reported_gone() {
        let monitor = ConnectionMonitor::new(Duration::from_millis(10));
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();

        let handle = monitor.spawn(move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                WatchVerdict::SessionStopped
            }
        });

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor never exited")
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_before_first_tick_runs_nothing() {
        let monitor = ConnectionMonitor::new(Duration::from_secs(60));
        let token = monitor.token();
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();

        let handle = monitor.spawn(move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                WatchVerdict::Healthy
            }
        });

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor never exited")
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
