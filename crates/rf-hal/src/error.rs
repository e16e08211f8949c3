//! Error types for the hardware layer

use thiserror::Error;

/// Result type for hardware layer calls
pub type HalResult<T> = Result<T, HalError>;

/// Errors reported by a hardware stream provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HalError {
    /// The hardware call itself failed (USB/Ethernet transport, driver fault)
    #[error("transport failure (code {code}): {message}")]
    Transport { code: i32, message: String },

    /// No device matched the given arguments
    #[error("device not found: {0}")]
    NotFound(String),

    /// Argument rejected by the device
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Capability not provided by this device
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Sensor or setting lookup failed
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),
}

impl HalError {
    /// Shorthand for a transport failure
    pub fn transport(code: i32, message: impl Into<String>) -> Self {
        HalError::Transport {
            code,
            message: message.into(),
        }
    }

    /// Whether this is a transport-level failure
    pub fn is_transport(&self) -> bool {
        matches!(self, HalError::Transport { .. })
    }
}
