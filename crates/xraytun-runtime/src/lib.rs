//! Runtime layer: everything that touches the operating system.
//!
//! The core crate defines the ports; this crate supplies the process
//! supervisor, tunnel manager, port allocator, log plumbing and the
//! session controller that ties them together. Hosts provide the
//! platform-specific pieces (interface provisioning, the native tunnel
//! driver) as port implementations and drive the controller with
//! session commands.

pub mod config;
pub mod launcher;
pub mod logstore;
pub mod monitor;
pub mod ports_alloc;
pub mod process;
pub mod session;
pub mod tunnel;

pub use config::EngineConfig;
pub use launcher::TokioEngineLauncher;
pub use logstore::FileLogStore;
pub use monitor::{ConnectionMonitor, WATCHDOG_INTERVAL, WatchVerdict};
pub use ports_alloc::PortAllocator;
pub use process::{LogPipe, ProcessSupervisor, StateCell};
pub use session::SessionController;
pub use tunnel::TunnelManager;
