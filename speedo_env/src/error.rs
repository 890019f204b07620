//! Sensor error taxonomy for the Speedo environment abstraction.

use thiserror::Error;

/// Errors reported by a position source.
///
/// A sample that merely fails validation is not an error; it is dropped
/// by the core without surfacing anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// The host has no position source at all
    #[error("Position source not supported")]
    NoSensorSupport,

    /// The user or platform refused access
    #[error("Permission denied")]
    PermissionDenied,

    /// No fix could be obtained (tunnel, indoors, ...)
    #[error("Position unavailable")]
    SignalUnavailable,

    /// The source gave up waiting for a fix
    #[error("Request timeout")]
    RequestTimeout,

    /// Anything else the source reports
    #[error("{0}")]
    Unknown(String),
}

impl SensorError {
    /// Creates an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether the session may recover from this error by re-subscribing.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SignalUnavailable | Self::RequestTimeout | Self::Unknown(_)
        )
    }

    /// Whether this error must end (or prevent) tracking.
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(SensorError::SignalUnavailable.is_retryable());
        assert!(SensorError::RequestTimeout.is_retryable());
        assert!(SensorError::unknown("glitch").is_retryable());
        assert!(SensorError::PermissionDenied.is_fatal());
        assert!(SensorError::NoSensorSupport.is_fatal());
    }

    #[test]
    fn test_display() {
        assert_eq!(SensorError::PermissionDenied.to_string(), "Permission denied");
        assert_eq!(SensorError::unknown("bus fault").to_string(), "bus fault");
    }
}
