//! Hardware stream provider traits
//!
//! A device hands out one receive streamer, one transmit streamer and the
//! transmit path's asynchronous event source. The streamers are driven by the
//! foreground caller; the event source is moved onto a background thread, so
//! it must be `Send + 'static`.
//!
//! ```text
//! DeviceFactory ──make──> RadioDevice ──rx_stream──> RxStreamer   (foreground)
//!                                     ──tx_stream──> TxStreamer   (foreground)
//!                                                 └─> AsyncEventSource (monitor thread)
//! ```

use std::time::Duration;

use crate::error::{HalError, HalResult};
use crate::metadata::{AsyncEvent, RxMetadata, TxMetadata};
use crate::{Sample, Timestamp};

/// Stream negotiation arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamArgs {
    /// Host sample format
    pub cpu_format: String,
    /// Over-the-wire sample format
    pub otw_format: String,
    /// Extra driver arguments
    pub args: String,
    /// Channel indices carried by the streamer
    pub channels: Vec<usize>,
}

impl StreamArgs {
    /// `fc32` on the host, `sc16` on the wire, channels `0..n`
    pub fn fc32(n_channels: usize) -> Self {
        Self {
            cpu_format: "fc32".to_string(),
            otw_format: "sc16".to_string(),
            args: String::new(),
            channels: (0..n_channels).collect(),
        }
    }

    /// Number of channels requested
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

/// Receive streaming mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    StartContinuous,
    StopContinuous,
    NumSampsAndDone(usize),
    NumSampsAndMore(usize),
}

/// A receive stream command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamCommand {
    pub mode: StreamMode,
    /// Execute immediately, ignoring `time_spec`
    pub stream_now: bool,
    /// When to execute the command if `stream_now` is false
    pub time_spec: Timestamp,
}

impl StreamCommand {
    /// Start continuous streaming at a device time
    pub fn start_continuous_at(time_spec: Timestamp) -> Self {
        Self {
            mode: StreamMode::StartContinuous,
            stream_now: false,
            time_spec,
        }
    }

    /// Stop continuous streaming immediately
    pub fn stop_now() -> Self {
        Self {
            mode: StreamMode::StopContinuous,
            stream_now: true,
            time_spec: Timestamp::ZERO,
        }
    }
}

/// A sensor reading
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Bool(bool),
    Real(f64),
    Int(i64),
    Text(String),
}

impl SensorValue {
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            SensorValue::Bool(b) => Some(*b),
            SensorValue::Int(i) => Some(*i != 0),
            SensorValue::Text(s) => match s.as_str() {
                "true" | "True" | "TRUE" | "locked" => Some(true),
                "false" | "False" | "FALSE" | "unlocked" => Some(false),
                _ => None,
            },
            SensorValue::Real(_) => None,
        }
    }

    pub fn to_real(&self) -> Option<f64> {
        match self {
            SensorValue::Real(v) => Some(*v),
            SensorValue::Int(i) => Some(*i as f64),
            SensorValue::Text(s) => s.trim().parse().ok(),
            SensorValue::Bool(_) => None,
        }
    }
}

/// Receive sample streamer
pub trait RxStreamer: Send {
    /// Channels carried per call
    fn num_channels(&self) -> usize;

    /// Largest sample count a single call delivers
    fn max_num_samps(&self) -> usize;

    /// Receive up to `buffs[0].len()` samples into every channel buffer
    ///
    /// `md` is overwritten with the metadata of this call. Returns the number
    /// of samples written to each buffer. A returned `Err` is a transport
    /// failure; per-call conditions (timeout, overflow) are reported through
    /// `md.error_code` instead.
    fn recv(
        &mut self,
        buffs: &mut [&mut [Sample]],
        md: &mut RxMetadata,
        timeout: Duration,
    ) -> HalResult<usize>;

    /// Issue a stream command (start/stop continuous streaming)
    fn issue_stream_cmd(&mut self, cmd: &StreamCommand) -> HalResult<()>;
}

/// Transmit sample streamer
pub trait TxStreamer: Send {
    /// Channels carried per call
    fn num_channels(&self) -> usize;

    /// Largest sample count a single call accepts
    fn max_num_samps(&self) -> usize;

    /// Send `buffs[0].len()` samples from every channel buffer
    ///
    /// Returns the number of samples accepted, which may be fewer than
    /// offered. A returned `Err` is a transport failure.
    fn send(&mut self, buffs: &[&[Sample]], md: &TxMetadata, timeout: Duration)
        -> HalResult<usize>;
}

/// Source of asynchronous transmit events
pub trait AsyncEventSource: Send {
    /// Wait up to `timeout` for the next event
    ///
    /// `Ok(None)` means no valid event arrived within the timeout.
    fn recv_async_msg(&mut self, timeout: Duration) -> HalResult<Option<AsyncEvent>>;
}

/// An opened radio device
pub trait RadioDevice: Send {
    type Rx: RxStreamer;
    type Tx: TxStreamer;
    type Events: AsyncEventSource + 'static;

    /// Negotiate the receive streamer
    fn rx_stream(&mut self, args: &StreamArgs) -> HalResult<Self::Rx>;

    /// Negotiate the transmit streamer and its asynchronous event source
    fn tx_stream(&mut self, args: &StreamArgs) -> HalResult<(Self::Tx, Self::Events)>;

    /// Current device time
    fn time_now(&self) -> HalResult<Timestamp>;

    /// Motherboard name (e.g. "B210", "X310")
    fn mboard_name(&self) -> HalResult<String>;

    fn set_rx_rate(&mut self, rate: f64, chan: usize) -> HalResult<()>;
    fn rx_rate(&self, chan: usize) -> HalResult<f64>;
    fn set_tx_rate(&mut self, rate: f64, chan: usize) -> HalResult<()>;
    fn tx_rate(&self, chan: usize) -> HalResult<f64>;

    fn set_rx_gain(&mut self, gain_db: f64, chan: usize) -> HalResult<()>;
    fn rx_gain(&self, chan: usize) -> HalResult<f64>;
    fn set_tx_gain(&mut self, gain_db: f64, chan: usize) -> HalResult<()>;
    fn tx_gain(&self, chan: usize) -> HalResult<f64>;

    fn set_rx_freq(&mut self, freq_hz: f64, chan: usize) -> HalResult<()>;
    fn rx_freq(&self, chan: usize) -> HalResult<f64>;
    fn set_tx_freq(&mut self, freq_hz: f64, chan: usize) -> HalResult<()>;
    fn tx_freq(&self, chan: usize) -> HalResult<f64>;

    fn set_master_clock_rate(&mut self, _rate: f64) -> HalResult<()> {
        Err(HalError::Unsupported("master clock rate".into()))
    }

    /// Select the reference clock ("internal", "external", "gpsdo")
    fn set_clock_source(&mut self, _source: &str) -> HalResult<()> {
        Err(HalError::Unsupported("clock source".into()))
    }

    fn mboard_sensor_names(&self) -> HalResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn rx_sensor_names(&self, _chan: usize) -> HalResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn mboard_sensor(&self, name: &str) -> HalResult<SensorValue> {
        Err(HalError::UnknownSensor(name.to_string()))
    }

    fn rx_sensor(&self, name: &str, _chan: usize) -> HalResult<SensorValue> {
        Err(HalError::UnknownSensor(name.to_string()))
    }
}

/// Enumerates and opens devices
pub trait DeviceFactory {
    type Device: RadioDevice;

    /// Device address strings matching `hint` (empty hint matches all)
    fn find(&self, hint: &str) -> HalResult<Vec<String>>;

    /// Open a device from an argument string
    fn make(&self, args: &str) -> HalResult<Self::Device>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_args_fc32() {
        let args = StreamArgs::fc32(2);
        assert_eq!(args.cpu_format, "fc32");
        assert_eq!(args.otw_format, "sc16");
        assert_eq!(args.channels, vec![0, 1]);
        assert_eq!(args.num_channels(), 2);
    }

    #[test]
    fn test_stream_commands() {
        let start = StreamCommand::start_continuous_at(Timestamp::new(5, 0.5));
        assert_eq!(start.mode, StreamMode::StartContinuous);
        assert!(!start.stream_now);

        let stop = StreamCommand::stop_now();
        assert_eq!(stop.mode, StreamMode::StopContinuous);
        assert!(stop.stream_now);
    }

    #[test]
    fn test_sensor_conversions() {
        assert_eq!(SensorValue::Bool(true).to_bool(), Some(true));
        assert_eq!(SensorValue::Text("False".into()).to_bool(), Some(false));
        assert_eq!(SensorValue::Real(-42.5).to_real(), Some(-42.5));
        assert_eq!(SensorValue::Text(" -61.0 ".into()).to_real(), Some(-61.0));
        assert_eq!(SensorValue::Real(1.0).to_bool(), None);
    }
}
