//! Error types for warden.

use crate::startup::StartupLevel;
use thiserror::Error;

/// Main error type for warden.
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Handshake with worker failed: {0}")]
    Handshake(String),

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    #[error("Startup failed before reaching {0}")]
    StartupFailed(StartupLevel),

    #[error("Worker launching is not available until startup reaches the partial level")]
    NotStarted,

    #[error("The {0} sequence has shut down")]
    SequenceStopped(&'static str),
}

/// Result type alias for warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
