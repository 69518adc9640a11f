//! Boundary to the host's persisted preference storage.

use crate::prefs::Preferences;

/// Supplies an immutable preference snapshot on demand.
///
/// Each session operation takes a fresh snapshot so a reload picks up
/// edits made since the last start.
pub trait PrefsSource: Send + Sync {
    fn snapshot(&self) -> Preferences;
}

impl PrefsSource for Preferences {
    fn snapshot(&self) -> Preferences {
        self.clone()
    }
}
