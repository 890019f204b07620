//! Error types for the speed estimation core.

use speedo_env::SensorError;
use thiserror::Error;

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Errors returned by caller-facing session commands.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start()` while a session is already running
    #[error("Tracking already in progress")]
    AlreadyTracking,

    /// The host has no position source; tracking never starts
    #[error("Position source not supported")]
    NoSensorSupport,

    /// The source refused the initial subscription
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The driver task is gone
    #[error("Session driver closed")]
    DriverClosed,
}
