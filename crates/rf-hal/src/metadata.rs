//! Stream metadata
//!
//! Receive metadata is filled in by the hardware on every receive call.
//! Transmit metadata is filled in by the host before every send call.
//! Asynchronous events are reported by the transmit path out of band.

use crate::Timestamp;

/// Error code reported in receive metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RxErrorCode {
    /// No error
    #[default]
    None,
    /// No packet received within the timeout
    Timeout,
    /// A stream command was issued with a time-spec already in the past
    LateCommand,
    /// Expected another stream command
    BrokenChain,
    /// Host did not read fast enough, samples were dropped
    Overflow,
    /// Multi-channel alignment failed
    Alignment,
    /// Packet could not be parsed
    BadPacket,
}

impl RxErrorCode {
    /// Raw code as reported by the reference driver API
    pub fn raw(&self) -> u32 {
        match self {
            RxErrorCode::None => 0x0,
            RxErrorCode::Timeout => 0x1,
            RxErrorCode::LateCommand => 0x2,
            RxErrorCode::BrokenChain => 0x4,
            RxErrorCode::Overflow => 0x8,
            RxErrorCode::Alignment => 0xC,
            RxErrorCode::BadPacket => 0xF,
        }
    }

    /// Whether this code reports a problem
    pub fn is_error(&self) -> bool {
        *self != RxErrorCode::None
    }
}

/// Metadata populated by a receive call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RxMetadata {
    /// Whether `time_spec` is valid
    pub has_time_spec: bool,
    /// Time of the first sample delivered by the call
    pub time_spec: Timestamp,
    /// Error code for the call
    pub error_code: RxErrorCode,
    /// First packet after a stream start
    pub start_of_burst: bool,
    /// Last packet before a stream stop
    pub end_of_burst: bool,
    /// Packet sequence gap detected (only meaningful with `Overflow`)
    pub out_of_sequence: bool,
}

impl RxMetadata {
    /// Fresh metadata with no time-spec and no error
    pub fn new() -> Self {
        Self::default()
    }
}

/// Metadata applied to a send call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TxMetadata {
    /// Whether the send is scheduled at `time_spec`
    pub has_time_spec: bool,
    /// Time the first sample of the call goes out
    pub time_spec: Timestamp,
    /// First packet of a burst
    pub start_of_burst: bool,
    /// Last packet of a burst
    pub end_of_burst: bool,
}

impl TxMetadata {
    /// Fresh metadata: untimed, not a burst boundary
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule subsequent sends at `time_spec`
    ///
    /// `has_time_spec` stays set for later sends.
    pub fn set_time_spec(&mut self, time_spec: Timestamp) {
        self.time_spec = time_spec;
        self.has_time_spec = true;
    }

    /// Advance the time-spec by `secs`
    pub fn add_time_spec(&mut self, secs: f64) {
        self.time_spec.add_secs(secs);
    }

    /// Set the start-of-burst flag
    pub fn set_start(&mut self, start: bool) {
        self.start_of_burst = start;
    }

    /// Set the end-of-burst flag
    pub fn set_end(&mut self, end: bool) {
        self.end_of_burst = end;
    }
}

/// Event code of an asynchronous transmit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsyncEventCode {
    /// A burst was transmitted successfully
    BurstAck,
    /// The device ran out of samples between packets
    Underflow,
    /// A packet sequence error was detected
    SeqError,
    /// A packet had a time-spec already in the past
    TimeError,
    /// The device ran out of samples inside a packet
    UnderflowInPacket,
    /// A packet sequence error was detected within a burst
    SeqErrorInBurst,
    /// Custom user payload
    UserPayload,
}

impl AsyncEventCode {
    /// Raw code as reported by the reference driver API
    pub fn raw(&self) -> u32 {
        match self {
            AsyncEventCode::BurstAck => 0x1,
            AsyncEventCode::Underflow => 0x2,
            AsyncEventCode::SeqError => 0x4,
            AsyncEventCode::TimeError => 0x8,
            AsyncEventCode::UnderflowInPacket => 0x10,
            AsyncEventCode::SeqErrorInBurst => 0x20,
            AsyncEventCode::UserPayload => 0x40,
        }
    }
}

/// An asynchronous event reported by the transmit path
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncEvent {
    /// Channel the event refers to
    pub channel: usize,
    /// Device time of the event, if the device reported one
    pub time_spec: Option<Timestamp>,
    /// What happened
    pub event_code: AsyncEventCode,
}

impl AsyncEvent {
    /// Event on channel 0 with no time-spec
    pub fn new(event_code: AsyncEventCode) -> Self {
        Self {
            channel: 0,
            time_spec: None,
            event_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_time_spec_is_sticky() {
        let mut md = TxMetadata::new();
        assert!(!md.has_time_spec);

        md.set_time_spec(Timestamp::new(3, 0.5));
        md.add_time_spec(0.75);

        assert!(md.has_time_spec);
        assert_eq!(md.time_spec.secs(), 4);
        assert!((md.time_spec.frac() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_burst_flags() {
        let mut md = TxMetadata::new();
        md.set_start(true);
        md.set_end(false);
        assert!(md.start_of_burst);
        assert!(!md.end_of_burst);
    }

    #[test]
    fn test_rx_error_codes() {
        assert!(!RxErrorCode::None.is_error());
        assert!(RxErrorCode::Overflow.is_error());
        assert_eq!(RxErrorCode::LateCommand.raw(), 0x2);
        assert_eq!(RxErrorCode::default(), RxErrorCode::None);
    }

    #[test]
    fn test_async_event_defaults() {
        let ev = AsyncEvent::new(AsyncEventCode::Underflow);
        assert_eq!(ev.channel, 0);
        assert!(ev.time_spec.is_none());
        assert_eq!(ev.event_code.raw(), 0x2);
    }
}
