//! Engine subprocess lifecycle: state, output, termination,
//! supervision.

mod liveness;
mod logs;
mod shutdown;
mod state;
mod supervisor;

pub use liveness::CachedLiveness;
pub use logs::{FLUSH_DELAY, LogPipe};
pub use shutdown::{FORCED_TIMEOUT, GRACEFUL_TIMEOUT, kill_process_safely, kill_pid, pid_exists};
pub use state::{PID_UNKNOWN, ProcessState, StateCell};
pub use supervisor::ProcessSupervisor;
