//! Port definitions for the runtime layer.
//!
//! Ports express intent, not implementation detail. The process
//! supervisor and tunnel manager never need to know that the engine is
//! an out-of-process binary or that the tunnel driver is native code.

mod engine;
mod error;
mod log_store;
mod prefs_source;
mod tunnel;

pub use engine::{EngineLauncher, EngineProcess, EngineSpawnSpec, SpawnedEngine};
pub use error::{ConfigError, ProcessError, TunnelError};
pub use log_store::LogStore;
pub use prefs_source::PrefsSource;
pub use tunnel::{TunAddress, TunInterfaceSpec, TunProvisioner, TunnelDriver};
