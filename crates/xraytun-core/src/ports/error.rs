//! Error taxonomy for the supervisor and tunnel ports.

use thiserror::Error;

/// Errors that can abort a configuration load before spawn.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file has been selected in preferences.
    #[error("no configuration selected")]
    NotSelected,

    /// Selected configuration file does not exist on disk.
    #[error("configuration file not found: {0}")]
    NotFound(String),

    /// Configuration exceeds the in-memory size cap.
    #[error("configuration too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    /// Configuration is not valid JSON.
    #[error("configuration is not valid JSON: {0}")]
    Invalid(String),

    /// Reading the configuration failed.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the engine process lifecycle.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// A live engine process already exists for this supervisor.
    #[error("engine already running")]
    AlreadyRunning,

    /// No live engine process exists.
    #[error("engine not running")]
    NotRunning,

    /// Configuration was rejected before spawn.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No usable control port could be found.
    #[error("no free port available: {0}")]
    PortExhausted(String),

    /// The OS refused to spawn the engine binary.
    #[error("failed to spawn engine: {0}")]
    SpawnFailed(String),

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from tunnel establishment and teardown.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The host refused to create the virtual interface.
    #[error("interface establishment refused: {0}")]
    EstablishRefused(String),

    /// Writing the tunnel configuration file failed.
    #[error("failed to write tunnel config: {0}")]
    ConfigWrite(#[from] std::io::Error),

    /// The native tunnel driver failed to start.
    #[error("tunnel driver start failed: {0}")]
    DriverStart(String),
}
