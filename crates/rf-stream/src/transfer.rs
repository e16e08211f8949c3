//! Bounded-attempt transfer state machine
//!
//! Both blocking engines move samples in chunks until the request is
//! satisfied or the attempt budget runs out:
//!
//! ```text
//!                 record(n), deficit > 0, attempts < max
//!                ┌───────┐
//!                ▼       │
//!  new ──> Accumulating ─┴─ record(n), deficit == 0 ──> Completed
//!                │
//!                ├─ record(n), attempts == max ───────> RetryExhausted
//!                └─ fail() ───────────────────────────> TransportFailed
//! ```
//!
//! At least one attempt is always made, so a zero-length request still
//! issues one hardware call. Non-blocking calls skip the loop; a short one
//! ends in `Partial`.

use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::error::{StreamError, StreamResult};

/// Default attempt budget per blocking call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// State of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Accumulating,
    Completed,
    RetryExhausted,
    TransportFailed,
    /// A single non-blocking call moved fewer samples than requested
    Partial,
}

/// Terminal summary of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    /// Samples the caller asked for
    pub requested: usize,
    /// Samples actually moved
    pub delivered: usize,
    /// Hardware calls issued
    pub attempts: u32,
    pub state: TransferState,
}

impl TransferReport {
    /// Report for a single unretried call
    ///
    /// A short call is `Partial`, never `RetryExhausted`: no retry happened.
    pub fn single(requested: usize, delivered: usize) -> Self {
        let state = if delivered >= requested {
            TransferState::Completed
        } else {
            TransferState::Partial
        };
        Self {
            requested,
            delivered,
            attempts: 1,
            state,
        }
    }

    /// Whether every requested sample was moved
    pub fn is_complete(&self) -> bool {
        self.state == TransferState::Completed
    }
}

/// A transfer in progress
#[derive(Debug, Clone)]
pub struct Transfer {
    requested: usize,
    delivered: usize,
    attempts: u32,
    max_attempts: u32,
    state: TransferState,
}

impl Transfer {
    pub fn new(requested: usize, max_attempts: u32) -> Self {
        Self {
            requested,
            delivered: 0,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            state: TransferState::Accumulating,
        }
    }

    pub fn is_accumulating(&self) -> bool {
        self.state == TransferState::Accumulating
    }

    /// Samples moved so far (also the write/read offset of the next chunk)
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Samples still outstanding
    pub fn deficit(&self) -> usize {
        self.requested - self.delivered
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Record the outcome of one hardware call that moved `n` samples
    pub fn record(&mut self, n: usize) -> TransferState {
        if !self.is_accumulating() {
            return self.state;
        }
        self.attempts += 1;
        self.delivered += n.min(self.deficit());

        if self.delivered >= self.requested {
            self.state = TransferState::Completed;
        } else if self.attempts >= self.max_attempts {
            self.state = TransferState::RetryExhausted;
        }
        self.state
    }

    /// Record a hardware call that failed outright
    pub fn fail(&mut self) -> TransferReport {
        self.attempts += 1;
        self.state = TransferState::TransportFailed;
        self.report()
    }

    pub fn report(&self) -> TransferReport {
        TransferReport {
            requested: self.requested,
            delivered: self.delivered,
            attempts: self.attempts,
            state: self.state,
        }
    }

    /// Sample count returned to the caller for a finished transfer
    ///
    /// A completed transfer returns the requested count. An exhausted one
    /// also returns the requested count under [`RetryPolicy::Legacy`] and an
    /// error under [`RetryPolicy::Strict`]; the true count is in the report.
    pub fn reported_count(&self, policy: RetryPolicy) -> StreamResult<usize> {
        match (self.state, policy) {
            (TransferState::Completed, _) => Ok(self.requested),
            (TransferState::RetryExhausted, RetryPolicy::Legacy) => Ok(self.requested),
            (TransferState::RetryExhausted, RetryPolicy::Strict) => {
                Err(StreamError::RetryExhausted {
                    requested: self.requested,
                    delivered: self.delivered,
                    attempts: self.attempts,
                })
            }
            // Callers only ask once the loop has ended
            (TransferState::Accumulating, _)
            | (TransferState::TransportFailed, _)
            | (TransferState::Partial, _) => Ok(self.delivered),
        }
    }
}
