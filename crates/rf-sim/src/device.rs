//! Simulated device and factory
//!
//! All mutable device state lives behind one shared lock so tests can keep a
//! [`SimHandle`] after the device has been moved into a session.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rf_hal::{
    AsyncEvent, AsyncEventCode, DeviceFactory, HalError, HalResult, RadioDevice, SensorValue,
    StreamArgs, StreamCommand, Timestamp, MAX_CHANNELS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::{event_queue, EventSender, SimEventQueue};
use crate::streamer::{RxStep, SimRxStreamer, SimTxStreamer, TxRecord};

pub(crate) type Shared = Arc<Mutex<SimState>>;

/// Highest gain the simulated front end accepts (dB)
const MAX_GAIN_DB: f64 = 89.75;

/// Configuration for a simulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimDeviceConfig {
    /// Address string reported by discovery
    pub device_addr: String,
    /// Motherboard name
    pub mboard_name: String,
    /// Receive burst limit (samples per call)
    pub rx_max_samps: usize,
    /// Transmit burst limit (samples per call)
    pub tx_max_samps: usize,
    /// Deliver at most this many samples per receive call
    pub rx_chunk: Option<usize>,
    /// Accept at most this many samples per send call
    pub tx_accept: Option<usize>,
    /// Report an underflow instead of a burst ack on every n-th burst
    pub underflow_every: Option<usize>,
    /// Initial master clock rate (Hz)
    pub master_clock_rate: f64,
    /// Whether the receive frontend has an `rssi` sensor
    pub has_rssi: bool,
    /// RSSI reading (dBm)
    pub rssi_dbm: f64,
    /// Whether the motherboard has a `ref_locked` sensor
    pub has_ref_sensor: bool,
    /// Whether receive streaming is running before any stream command
    pub streaming: bool,
}

impl Default for SimDeviceConfig {
    fn default() -> Self {
        Self {
            device_addr: "type=b200,serial=SIM0001".to_string(),
            mboard_name: "B210".to_string(),
            rx_max_samps: 2040,
            tx_max_samps: 2040,
            rx_chunk: None,
            tx_accept: None,
            underflow_every: None,
            master_clock_rate: 30.72e6,
            has_rssi: true,
            rssi_dbm: -62.5,
            has_ref_sensor: true,
            streaming: true,
        }
    }
}

impl SimDeviceConfig {
    /// An X300-family device
    pub fn x300() -> Self {
        Self {
            device_addr: "type=x300,addr=192.168.40.2".to_string(),
            mboard_name: "X310".to_string(),
            rx_max_samps: 1996,
            tx_max_samps: 1996,
            master_clock_rate: 184.32e6,
            has_rssi: false,
            ..Default::default()
        }
    }
}

/// State shared between the device, its streamers and handles
#[derive(Debug)]
pub(crate) struct SimState {
    epoch: Instant,
    pub rx_rate: [f64; MAX_CHANNELS],
    pub tx_rate: [f64; MAX_CHANNELS],
    pub rx_gain: [f64; MAX_CHANNELS],
    pub tx_gain: [f64; MAX_CHANNELS],
    pub rx_freq: [f64; MAX_CHANNELS],
    pub tx_freq: [f64; MAX_CHANNELS],
    pub master_clock_rate: f64,
    pub clock_source: String,
    pub ref_locked: bool,
    pub streaming: bool,
    pub stream_cmds: Vec<StreamCommand>,
    pub rx_script: VecDeque<RxStep>,
    pub rx_backlog: usize,
    pub rx_calls: usize,
    pub tx_log: Vec<TxRecord>,
    pub tx_fail_next: bool,
    pub bursts_ended: usize,
}

impl SimState {
    fn new(config: &SimDeviceConfig) -> Self {
        Self {
            epoch: Instant::now(),
            rx_rate: [1e6; MAX_CHANNELS],
            tx_rate: [1e6; MAX_CHANNELS],
            rx_gain: [0.0; MAX_CHANNELS],
            tx_gain: [0.0; MAX_CHANNELS],
            rx_freq: [0.0; MAX_CHANNELS],
            tx_freq: [0.0; MAX_CHANNELS],
            master_clock_rate: config.master_clock_rate,
            clock_source: "internal".to_string(),
            ref_locked: true,
            streaming: config.streaming,
            stream_cmds: Vec::new(),
            rx_script: VecDeque::new(),
            rx_backlog: 0,
            rx_calls: 0,
            tx_log: Vec::new(),
            tx_fail_next: false,
            bursts_ended: 0,
        }
    }

    /// Device time: seconds since the device was made
    pub fn now(&self) -> Timestamp {
        Timestamp::from_secs_f64(self.epoch.elapsed().as_secs_f64())
    }

    /// Nearest rate the master clock can divide down to
    fn coerce_rate(&self, rate: f64) -> HalResult<f64> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(HalError::InvalidArgument(format!("sample rate {rate}")));
        }
        let decim = (self.master_clock_rate / rate).round().max(1.0);
        Ok(self.master_clock_rate / decim)
    }
}

/// A simulated radio device
#[derive(Debug)]
pub struct SimDevice {
    config: SimDeviceConfig,
    args: String,
    state: Shared,
    events_tx: EventSender,
    events_rx: Option<SimEventQueue>,
}

impl SimDevice {
    pub fn new(config: SimDeviceConfig) -> Self {
        let args = config.device_addr.clone();
        Self::with_args(config, args)
    }

    /// Create a device as if opened with `args`
    ///
    /// A `master_clock_rate=` entry overrides the configured clock rate.
    pub fn with_args(mut config: SimDeviceConfig, args: impl Into<String>) -> Self {
        let args = args.into();
        if let Some(rate) = arg_value(&args, "master_clock_rate").and_then(|v| v.parse().ok()) {
            config.master_clock_rate = rate;
        }
        let state = Arc::new(Mutex::new(SimState::new(&config)));
        let (events_tx, events_rx) = event_queue();
        Self {
            config,
            args,
            state,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Arguments the device was opened with
    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn config(&self) -> &SimDeviceConfig {
        &self.config
    }

    /// Handle for inspecting and scripting the device
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
            events: self.events_tx.clone(),
        }
    }
}

fn check_chan(chan: usize) -> HalResult<()> {
    if chan < MAX_CHANNELS {
        Ok(())
    } else {
        Err(HalError::InvalidArgument(format!("channel {chan}")))
    }
}

fn check_stream_args(args: &StreamArgs) -> HalResult<usize> {
    if args.channels.is_empty() {
        return Err(HalError::InvalidArgument("no channels requested".into()));
    }
    for &chan in &args.channels {
        check_chan(chan)?;
    }
    Ok(args.num_channels())
}

impl RadioDevice for SimDevice {
    type Rx = SimRxStreamer;
    type Tx = SimTxStreamer;
    type Events = SimEventQueue;

    fn rx_stream(&mut self, args: &StreamArgs) -> HalResult<SimRxStreamer> {
        let channels = check_stream_args(args)?;
        debug!("Negotiated {}-channel receive streamer", channels);
        Ok(SimRxStreamer::new(
            self.state.clone(),
            channels,
            self.config.rx_max_samps,
            self.config.rx_chunk,
        ))
    }

    fn tx_stream(&mut self, args: &StreamArgs) -> HalResult<(SimTxStreamer, SimEventQueue)> {
        let channels = check_stream_args(args)?;
        let events = self
            .events_rx
            .take()
            .ok_or_else(|| HalError::Unsupported("second transmit streamer".into()))?;
        debug!("Negotiated {}-channel transmit streamer", channels);
        let streamer = SimTxStreamer::new(
            self.state.clone(),
            self.events_tx.clone(),
            channels,
            self.config.tx_max_samps,
            self.config.tx_accept,
            self.config.underflow_every,
        );
        Ok((streamer, events))
    }

    fn time_now(&self) -> HalResult<Timestamp> {
        Ok(self.state.lock().now())
    }

    fn mboard_name(&self) -> HalResult<String> {
        Ok(self.config.mboard_name.clone())
    }

    fn set_rx_rate(&mut self, rate: f64, chan: usize) -> HalResult<()> {
        check_chan(chan)?;
        let mut state = self.state.lock();
        let actual = state.coerce_rate(rate)?;
        state.rx_rate[chan] = actual;
        Ok(())
    }

    fn rx_rate(&self, chan: usize) -> HalResult<f64> {
        check_chan(chan)?;
        Ok(self.state.lock().rx_rate[chan])
    }

    fn set_tx_rate(&mut self, rate: f64, chan: usize) -> HalResult<()> {
        check_chan(chan)?;
        let mut state = self.state.lock();
        let actual = state.coerce_rate(rate)?;
        state.tx_rate[chan] = actual;
        Ok(())
    }

    fn tx_rate(&self, chan: usize) -> HalResult<f64> {
        check_chan(chan)?;
        Ok(self.state.lock().tx_rate[chan])
    }

    fn set_rx_gain(&mut self, gain_db: f64, chan: usize) -> HalResult<()> {
        check_chan(chan)?;
        self.state.lock().rx_gain[chan] = gain_db.clamp(0.0, MAX_GAIN_DB);
        Ok(())
    }

    fn rx_gain(&self, chan: usize) -> HalResult<f64> {
        check_chan(chan)?;
        Ok(self.state.lock().rx_gain[chan])
    }

    fn set_tx_gain(&mut self, gain_db: f64, chan: usize) -> HalResult<()> {
        check_chan(chan)?;
        self.state.lock().tx_gain[chan] = gain_db.clamp(0.0, MAX_GAIN_DB);
        Ok(())
    }

    fn tx_gain(&self, chan: usize) -> HalResult<f64> {
        check_chan(chan)?;
        Ok(self.state.lock().tx_gain[chan])
    }

    fn set_rx_freq(&mut self, freq_hz: f64, chan: usize) -> HalResult<()> {
        check_chan(chan)?;
        self.state.lock().rx_freq[chan] = freq_hz;
        Ok(())
    }

    fn rx_freq(&self, chan: usize) -> HalResult<f64> {
        check_chan(chan)?;
        Ok(self.state.lock().rx_freq[chan])
    }

    fn set_tx_freq(&mut self, freq_hz: f64, chan: usize) -> HalResult<()> {
        check_chan(chan)?;
        self.state.lock().tx_freq[chan] = freq_hz;
        Ok(())
    }

    fn tx_freq(&self, chan: usize) -> HalResult<f64> {
        check_chan(chan)?;
        Ok(self.state.lock().tx_freq[chan])
    }

    fn set_master_clock_rate(&mut self, rate: f64) -> HalResult<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(HalError::InvalidArgument(format!("master clock rate {rate}")));
        }
        self.state.lock().master_clock_rate = rate;
        Ok(())
    }

    fn set_clock_source(&mut self, source: &str) -> HalResult<()> {
        match source {
            "internal" | "external" | "gpsdo" => {
                self.state.lock().clock_source = source.to_string();
                Ok(())
            }
            other => Err(HalError::InvalidArgument(format!("clock source {other}"))),
        }
    }

    fn mboard_sensor_names(&self) -> HalResult<Vec<String>> {
        Ok(if self.config.has_ref_sensor {
            vec!["ref_locked".to_string()]
        } else {
            Vec::new()
        })
    }

    fn rx_sensor_names(&self, chan: usize) -> HalResult<Vec<String>> {
        check_chan(chan)?;
        let mut names = vec!["lo_locked".to_string()];
        if self.config.has_rssi {
            names.push("rssi".to_string());
        }
        Ok(names)
    }

    fn mboard_sensor(&self, name: &str) -> HalResult<SensorValue> {
        match name {
            "ref_locked" if self.config.has_ref_sensor => {
                Ok(SensorValue::Bool(self.state.lock().ref_locked))
            }
            _ => Err(HalError::UnknownSensor(name.to_string())),
        }
    }

    fn rx_sensor(&self, name: &str, chan: usize) -> HalResult<SensorValue> {
        check_chan(chan)?;
        match name {
            "rssi" if self.config.has_rssi => Ok(SensorValue::Real(self.config.rssi_dbm)),
            "lo_locked" => Ok(SensorValue::Bool(true)),
            _ => Err(HalError::UnknownSensor(name.to_string())),
        }
    }
}

/// Shared view of a [`SimDevice`] for scripting and inspection
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Shared,
    events: EventSender,
}

impl SimHandle {
    /// Queue an asynchronous transmit event
    pub fn inject_event(&self, code: AsyncEventCode) {
        let _ = self.events.send(Ok(AsyncEvent::new(code)));
    }

    /// Make the next event poll fail
    pub fn inject_event_failure(&self, error: HalError) {
        let _ = self.events.send(Err(error));
    }

    /// Script the next receive calls, in order
    pub fn script_rx(&self, steps: impl IntoIterator<Item = RxStep>) {
        self.state.lock().rx_script.extend(steps);
    }

    /// Make `samples` available to non-blocking receives
    pub fn queue_rx_backlog(&self, samples: usize) {
        self.state.lock().rx_backlog += samples;
    }

    /// Fail the next send call
    pub fn fail_next_send(&self) {
        self.state.lock().tx_fail_next = true;
    }

    pub fn set_ref_locked(&self, locked: bool) {
        self.state.lock().ref_locked = locked;
    }

    pub fn tx_log(&self) -> Vec<TxRecord> {
        self.state.lock().tx_log.clone()
    }

    pub fn clear_tx_log(&self) {
        self.state.lock().tx_log.clear();
    }

    pub fn rx_calls(&self) -> usize {
        self.state.lock().rx_calls
    }

    pub fn stream_commands(&self) -> Vec<StreamCommand> {
        self.state.lock().stream_cmds.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().streaming
    }

    pub fn clock_source(&self) -> String {
        self.state.lock().clock_source.clone()
    }

    pub fn master_clock_rate(&self) -> f64 {
        self.state.lock().master_clock_rate
    }

    pub fn now(&self) -> Timestamp {
        self.state.lock().now()
    }
}

/// Enumerates and makes simulated devices
#[derive(Debug, Clone)]
pub struct SimFactory {
    devices: Vec<SimDeviceConfig>,
}

impl Default for SimFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFactory {
    /// A factory with one default B200-family device
    pub fn new() -> Self {
        Self {
            devices: vec![SimDeviceConfig::default()],
        }
    }

    /// A factory with no devices
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    pub fn with_device(mut self, config: SimDeviceConfig) -> Self {
        self.devices.push(config);
        self
    }

    fn select(&self, args: &str) -> Option<&SimDeviceConfig> {
        match arg_value(args, "type") {
            Some(kind) => {
                let needle = format!("type={kind}");
                self.devices.iter().find(|d| d.device_addr.contains(&needle))
            }
            None => self.devices.first(),
        }
    }
}

impl DeviceFactory for SimFactory {
    type Device = SimDevice;

    fn find(&self, hint: &str) -> HalResult<Vec<String>> {
        Ok(self
            .devices
            .iter()
            .filter(|d| d.device_addr.contains(hint))
            .map(|d| d.device_addr.clone())
            .collect())
    }

    fn make(&self, args: &str) -> HalResult<SimDevice> {
        let config = self
            .select(args)
            .ok_or_else(|| HalError::NotFound(format!("no simulated device matches '{args}'")))?;
        info!("Simulated {} opened", config.mboard_name);
        Ok(SimDevice::with_args(config.clone(), args))
    }
}

/// Value of `key=value` in a comma-separated argument string
fn arg_value<'a>(args: &'a str, key: &str) -> Option<&'a str> {
    args.split(',')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim())
}
