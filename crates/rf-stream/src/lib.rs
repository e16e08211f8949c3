//! Timed Streaming Engine
//!
//! This crate drives an [`rf_hal`] device as a timed-streaming front end:
//! blocking and non-blocking receive, burst-chunked timed transmit, and a
//! background thread that turns asynchronous hardware events into faults.
//!
//! # Architecture
//!
//! A [`StreamSession`] owns one opened device and everything attached to it:
//!
//! - **Receive engine**: fills one buffer per channel, retrying partial
//!   deliveries and reporting overflow / late-command codes inline
//! - **Transmit engine**: splits sends at the hardware burst limit, frames the
//!   burst with start/end flags and advances the time-spec per chunk
//! - **Fault monitor**: a dedicated thread polling the asynchronous event
//!   queue for underflow and timing errors
//!
//! Faults from both paths go to a single registered [`FaultHandler`]. Blocking
//! calls are bounded by an attempt budget; every call returns a
//! [`TransferReport`] with the true delivered count, and the
//! [`RetryPolicy`] decides what happens when the budget runs out.
//!
//! # Example
//!
//! ```rust,no_run
//! use rf_hal::{FaultRecord, Sample};
//! use rf_sim::SimFactory;
//! use rf_stream::{SessionConfig, StreamSession};
//!
//! let factory = SimFactory::new();
//! let mut session = StreamSession::open(&factory, SessionConfig::default())?;
//! session.register_fault_handler(|fault: FaultRecord| eprintln!("{fault}"));
//!
//! let burst = vec![Sample::new(0.5, 0.0); 4096];
//! let at = session.time_now()? + 0.1;
//! session.send_timed(&burst, burst.len(), Some(at), true, true, true)?;
//!
//! let mut rx = vec![Sample::default(); 4096];
//! let outcome = session.recv(&mut rx, 4096, true)?;
//! println!("{} samples at {:?}", outcome.samples, outcome.time_spec);
//!
//! session.close()?;
//! # Ok::<(), rf_stream::StreamError>(())
//! ```

pub mod args;
pub mod config;
pub mod error;
pub mod faults;
pub mod monitor;
pub mod receive;
pub mod session;
pub mod transfer;
pub mod transmit;

pub use args::{ResolvedArgs, DEVNAME_B200, DEVNAME_UNKNOWN, DEVNAME_X300};
pub use config::{RetryPolicy, SessionConfig, DEFAULT_SAMPLE_RATE, DEFAULT_ZERO_PAD_SAMPLES};
pub use error::{StreamError, StreamResult};
pub use faults::FaultSlot;
pub use monitor::{FaultMonitor, MonitorExit};
pub use receive::{RxEngine, RxOutcome};
pub use session::StreamSession;
pub use transfer::{Transfer, TransferReport, TransferState, DEFAULT_MAX_ATTEMPTS};
pub use transmit::{BurstFlags, TxEngine, TxOutcome};

// Re-exported so callers need not depend on rf-hal for the common types
pub use rf_hal::{FaultHandler, FaultKind, FaultRecord, Sample, Timestamp};
