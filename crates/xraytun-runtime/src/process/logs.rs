//! Engine output draining and batched log notifications.
//!
//! Every line is appended to the durable store synchronously before
//! anything else happens to it, so logs survive even if the host is
//! killed right after. Notification delivery is decoupled: lines
//! accumulate in a batch that is emitted as one event no earlier than
//! a fixed delay after the first unflushed line arrived, coalescing
//! bursts.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::debug;

use xraytun_core::events::SessionEvent;
use xraytun_core::ports::LogStore;

/// Delay between the first unflushed line and the batch notification.
pub const FLUSH_DELAY: Duration = Duration::from_millis(3000);

/// Pending lines plus the bookkeeping that ties each flush timer to
/// the batch it was scheduled for.
#[derive(Default)]
struct Batch {
    lines: Vec<String>,
    /// Bumped on every flush; a timer scheduled for an older epoch
    /// finds its batch already emitted and does nothing, so a flush
    /// racing with new pushes cannot shorten the next window.
    epoch: u64,
    flush_scheduled: bool,
}

/// Moves engine output into the durable store and batches it into
/// periodic notifications.
#[derive(Clone)]
pub struct LogPipe {
    store: Arc<dyn LogStore>,
    batch: Arc<Mutex<Batch>>,
    flush_delay: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl LogPipe {
    pub fn new(store: Arc<dyn LogStore>, events: broadcast::Sender<SessionEvent>) -> Self {
        Self::with_delay(store, events, FLUSH_DELAY)
    }

    pub fn with_delay(
        store: Arc<dyn LogStore>,
        events: broadcast::Sender<SessionEvent>,
        flush_delay: Duration,
    ) -> Self {
        Self {
            store,
            batch: Arc::new(Mutex::new(Batch::default())),
            flush_delay,
            events,
        }
    }

    /// Ingest one output line: durable append, then batch for notify.
    pub fn push(&self, line: String) {
        self.store.append(&line);
        let scheduled_for = {
            let mut batch = self.batch.lock().unwrap();
            batch.lines.push(line);
            if batch.flush_scheduled {
                None
            } else {
                batch.flush_scheduled = true;
                Some(batch.epoch)
            }
        };
        if let Some(epoch) = scheduled_for {
            let pipe = self.clone();
            tokio::spawn(async move {
                sleep(pipe.flush_delay).await;
                pipe.flush_epoch(epoch);
            });
        }
    }

    /// Emit the pending batch immediately, if any.
    ///
    /// Also called on session stop so no tail of output is lost.
    pub fn flush_now(&self) {
        let mut batch = self.batch.lock().unwrap();
        Self::emit(&self.events, &mut batch);
    }

    /// Timer-driven flush; a no-op when `epoch` has been superseded.
    fn flush_epoch(&self, epoch: u64) {
        let mut batch = self.batch.lock().unwrap();
        if batch.epoch != epoch {
            return;
        }
        Self::emit(&self.events, &mut batch);
    }

    fn emit(events: &broadcast::Sender<SessionEvent>, batch: &mut Batch) {
        batch.flush_scheduled = false;
        batch.epoch += 1;
        if batch.lines.is_empty() {
            return;
        }
        let lines = std::mem::take(&mut batch.lines);
        debug!(count = lines.len(), "emitting log batch");
        let _ = events.send(SessionEvent::log_batch(lines));
    }

    /// Read `reader` line by line into the pipe until EOF.
    ///
    /// Read errors end the drain like EOF; they are a normal exit path
    /// for a dying subprocess, not an error.
    pub async fn drain<R: AsyncRead + Unpin>(&self, reader: R) {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            self.push(line);
        }
    }
}
