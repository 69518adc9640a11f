//! Commands accepted by the session controller.
//!
//! In the host environment these arrive as service intents; here they
//! are a plain enum so any transport can drive the session.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionCommand {
    /// Bring the session up in the mode implied by preferences.
    Start,
    /// Tear the session down.
    Stop,
    /// Replace the running engine with a freshly spawned one using the
    /// current configuration, keeping the tunnel interface.
    Reload,
}
