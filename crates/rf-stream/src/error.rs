//! Error types for the streaming engine

use rf_hal::HalError;
use thiserror::Error;

use crate::transfer::TransferReport;

/// Result type for streaming calls
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while streaming
#[derive(Debug, Error)]
pub enum StreamError {
    /// Hardware call failed outside of a transfer loop
    #[error("hardware error: {0}")]
    Hal(#[from] HalError),

    /// Hardware call failed inside a transfer loop; the call was aborted
    #[error("transport failure on attempt {}: {source}", .report.attempts)]
    Transport {
        source: HalError,
        /// Progress made before the failure
        report: TransferReport,
    },

    /// Wrong number of channel buffers for the streamer
    #[error("expected {expected} channel buffers, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    /// A channel buffer cannot hold the requested samples
    #[error("channel {channel} buffer holds {len} samples, {needed} requested")]
    BufferTooShort {
        channel: usize,
        len: usize,
        needed: usize,
    },

    /// Attempt limit reached before the transfer completed (strict retry policy)
    #[error("retry limit reached after {attempts} attempts: {delivered} of {requested} samples transferred")]
    RetryExhausted {
        requested: usize,
        delivered: usize,
        attempts: u32,
    },

    /// The fault monitor thread could not be started
    #[error("failed to start fault monitor: {0}")]
    MonitorSpawn(#[source] std::io::Error),

    /// Invalid session configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Negative status code for callers that expect the legacy integer return
    ///
    /// Input and configuration errors map to -2, everything else to -1.
    pub fn status_code(&self) -> i32 {
        match self {
            StreamError::ChannelCount { .. }
            | StreamError::BufferTooShort { .. }
            | StreamError::Config(_)
            | StreamError::Json(_) => -2,
            _ => -1,
        }
    }

    /// Whether the hardware transport failed
    pub fn is_transport(&self) -> bool {
        match self {
            StreamError::Transport { .. } => true,
            StreamError::Hal(e) => e.is_transport(),
            _ => false,
        }
    }
}
