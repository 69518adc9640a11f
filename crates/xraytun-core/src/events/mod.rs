//! Session lifecycle events.

mod session;

pub use session::{SessionEvent, SessionMode, SessionStatus};
