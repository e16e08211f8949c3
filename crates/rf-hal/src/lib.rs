//! RF Hardware Abstraction Library
//!
//! This crate describes the capability set a timed-streaming front end needs
//! from the radio hardware layer underneath it:
//!
//! - **Streamers**: receive and transmit sample streamers with a per-call
//!   burst limit (`max_num_samps`)
//! - **Metadata**: receive/transmit metadata carrying time-specs, burst flags
//!   and error codes, plus asynchronous transmit events
//! - **Device**: the device clock, stream negotiation, and the rate, gain,
//!   frequency and sensor pass-throughs
//! - **Faults**: the small fault taxonomy (`Overflow`, `Late`, `Underflow`)
//!   and the handler trait faults are delivered to
//!
//! The hardware layer itself is a black box; drivers (or the `rf-sim`
//! simulator) implement the traits in [`provider`].
//!
//! # Example
//!
//! ```rust
//! use rf_hal::Timestamp;
//!
//! // 0.75 s + 0.5 s carries into the seconds field
//! let t = Timestamp::new(10, 0.75) + 0.5;
//! assert_eq!(t.secs(), 11);
//! assert!((t.frac() - 0.25).abs() < 1e-12);
//! ```

pub mod error;
pub mod fault;
pub mod metadata;
pub mod provider;
pub mod timestamp;

pub use error::{HalError, HalResult};
pub use fault::{FaultCounters, FaultCounts, FaultHandler, FaultKind, FaultRecord};
pub use metadata::{AsyncEvent, AsyncEventCode, RxErrorCode, RxMetadata, TxMetadata};
pub use provider::{
    AsyncEventSource, DeviceFactory, RadioDevice, RxStreamer, SensorValue, StreamArgs,
    StreamCommand, StreamMode, TxStreamer,
};
pub use timestamp::Timestamp;

/// Host-side sample format (`fc32`): interleaved 32-bit float I/Q
pub type Sample = num_complex::Complex32;

/// Maximum number of channels a single streamer call carries
pub const MAX_CHANNELS: usize = 4;
