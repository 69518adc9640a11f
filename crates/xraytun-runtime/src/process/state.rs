//! Shared process state, replaced atomically as a whole record.
//!
//! Every mutation swaps the entire generation record under one lock,
//! so no reader ever observes a handle/pid pair from two different
//! generations. Exit handlers compare their process against the
//! current record by identity before touching anything, which keeps a
//! slow old-generation cleanup from clobbering a new generation.

use std::fmt;
use std::sync::{Arc, Mutex};

use xraytun_core::ports::EngineProcess;

/// Pid value meaning "unknown".
pub const PID_UNKNOWN: i64 = -1;

/// Immutable snapshot of the supervisor's current generation.
#[derive(Clone)]
pub struct ProcessState {
    /// Owning reference to the live engine process, or absent.
    pub process: Option<Arc<dyn EngineProcess>>,
    /// Tracked independently of the handle: the handle can become
    /// unusable while the OS process, and thus its pid, stays valid.
    pub pid: i64,
    /// True while a reload-triggered replacement is in flight.
    pub reloading: bool,
}

impl ProcessState {
    fn empty() -> Self {
        Self {
            process: None,
            pid: PID_UNKNOWN,
            reloading: false,
        }
    }

    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }
}

impl fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessState")
            .field("has_process", &self.process.is_some())
            .field("pid", &self.pid)
            .field("reloading", &self.reloading)
            .finish()
    }
}

/// Cell holding the current generation record.
///
/// All mutation is load-modify-swap of the whole record.
pub struct StateCell {
    inner: Mutex<ProcessState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ProcessState::empty()),
        }
    }

    /// Snapshot the current generation.
    pub fn load(&self) -> ProcessState {
        self.inner.lock().unwrap().clone()
    }

    /// Publish a freshly spawned generation, clearing `reloading`.
    ///
    /// Returns the replaced record so the caller can verify the
    /// previous generation was already retired.
    pub fn publish(&self, process: Arc<dyn EngineProcess>, pid: Option<u32>) -> ProcessState {
        let next = ProcessState {
            process: Some(process),
            pid: pid.map_or(PID_UNKNOWN, i64::from),
            reloading: false,
        };
        std::mem::replace(&mut *self.inner.lock().unwrap(), next)
    }

    /// Swap in a record with `reloading = true`, preserving the
    /// existing handle and pid, and return the prior snapshot.
    pub fn mark_reloading(&self) -> ProcessState {
        let mut guard = self.inner.lock().unwrap();
        let prior = guard.clone();
        let next = ProcessState {
            process: prior.process.clone(),
            pid: prior.pid,
            reloading: true,
        };
        *guard = next;
        prior
    }

    /// Clear the cell and return whatever was present.
    pub fn take(&self) -> ProcessState {
        std::mem::replace(&mut *self.inner.lock().unwrap(), ProcessState::empty())
    }

    /// Clear the cell only if `process` is the current generation.
    ///
    /// Returns `Some(reloading)` captured from the cleared record, or
    /// `None` if the given process has already been superseded (the
    /// cell is left untouched).
    pub fn clear_if_current(&self, process: &Arc<dyn EngineProcess>) -> Option<bool> {
        let mut guard = self.inner.lock().unwrap();
        let matches = guard
            .process
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, process));
        if !matches {
            return None;
        }
        let cleared = std::mem::replace(&mut *guard, ProcessState::empty());
        Some(cleared.reloading)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
