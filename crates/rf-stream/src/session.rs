//! Stream session
//!
//! A [`StreamSession`] owns one opened device: its receive and transmit
//! engines, the fault handler slot and the fault monitor thread. Send and
//! receive take `&mut self` and close consumes the session, so a session can
//! never be closed under an in-flight call.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rf_hal::{
    DeviceFactory, FaultHandler, HalError, RadioDevice, Sample, StreamArgs, StreamCommand,
    Timestamp,
};
use tracing::{debug, info, warn};

use crate::args;
use crate::config::SessionConfig;
use crate::error::{StreamError, StreamResult};
use crate::faults::FaultSlot;
use crate::monitor::{FaultMonitor, MonitorExit};
use crate::receive::{RxEngine, RxOutcome};
use crate::transmit::{BurstFlags, TxEngine, TxOutcome};

/// Samples per non-blocking receive while flushing
pub const FLUSH_CHUNK_SAMPLES: usize = 1024;

/// Budget for the reference clock to lock
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(300);

const LOCK_POLL: Duration = Duration::from_millis(1);
const NO_LOCK_SENSOR_WAIT: Duration = Duration::from_micros(500);

/// One opened device and its streaming state
pub struct StreamSession<D: RadioDevice> {
    rx: RxEngine<D::Rx>,
    tx: TxEngine<D::Tx>,
    monitor: FaultMonitor,
    faults: Arc<FaultSlot>,
    config: SessionConfig,
    devname: &'static str,
    dynamic_rate: bool,
    has_rssi: bool,
    closed: bool,
    // Dropped after the streamers
    device: D,
}

impl<D: RadioDevice> StreamSession<D> {
    /// Discover, resolve arguments and open a device through `factory`
    pub fn open<F>(factory: &F, config: SessionConfig) -> StreamResult<Self>
    where
        F: DeviceFactory<Device = D>,
    {
        config.validate()?;

        let found = factory.find("")?;
        debug!("Discovered {} device(s)", found.len());
        let resolved = args::resolve(&config.device_args, &found);

        if args::is_silent(&resolved.args) {
            debug!("Opening device with args: {}", resolved.args);
        } else {
            info!("Opening device with args: {}", resolved.args);
        }
        let device = factory.make(&resolved.args)?;

        let devname = match resolved.devname {
            Some(name) => name,
            None => args::devname_from_mboard(&device.mboard_name()?),
        };

        Self::start(device, config, &resolved.args, devname, resolved.dynamic_rate)
    }

    /// Open a session on a device that has already been made
    pub fn from_device(device: D, config: SessionConfig) -> StreamResult<Self> {
        config.validate()?;
        let devname = args::devname_from_mboard(&device.mboard_name()?);
        let device_args = config.device_args.clone();
        Self::start(device, config, &device_args, devname, true)
    }

    fn start(
        mut device: D,
        config: SessionConfig,
        device_args: &str,
        devname: &'static str,
        dynamic_rate: bool,
    ) -> StreamResult<Self> {
        if let Some(source) = args::clock_source(device_args) {
            info!("Using {} reference clock", source);
            if let Err(e) = device.set_clock_source(source) {
                warn!("Could not select {} clock source: {}", source, e);
            }
        }

        let has_rssi = match device.rx_sensor_names(0) {
            Ok(names) => names.iter().any(|n| n.contains("rssi")),
            Err(e) => {
                debug!("Could not list receive sensors: {}", e);
                false
            }
        };

        // Default rates avoid decimation warnings before the caller sets its own
        for chan in 0..config.rx_channels {
            device.set_rx_rate(config.default_rx_rate, chan)?;
        }
        for chan in 0..config.tx_channels {
            device.set_tx_rate(config.default_tx_rate, chan)?;
        }

        let rx_streamer = device.rx_stream(&StreamArgs::fc32(config.rx_channels))?;
        let (tx_streamer, events) = device.tx_stream(&StreamArgs::fc32(config.tx_channels))?;
        let tx_rate = device.tx_rate(0)?;

        let faults = Arc::new(FaultSlot::new());
        let rx = RxEngine::new(
            rx_streamer,
            config.rx_timeout()?,
            config.max_attempts,
            config.retry_policy,
            faults.clone(),
        );
        let tx = TxEngine::new(
            tx_streamer,
            tx_rate,
            config.zero_pad_samples,
            config.tx_timeout()?,
            config.max_attempts,
            config.retry_policy,
        )?;

        let monitor = FaultMonitor::spawn(events, faults.clone(), config.async_poll()?)
            .map_err(StreamError::MonitorSpawn)?;

        info!(
            "Opened {}: {} rx / {} tx channel(s), max burst {} rx / {} tx samples",
            devname,
            rx.num_channels(),
            tx.num_channels(),
            rx.max_burst(),
            tx.max_burst()
        );

        Ok(Self {
            rx,
            tx,
            monitor,
            faults,
            config,
            devname,
            dynamic_rate,
            has_rssi,
            closed: false,
            device,
        })
    }

    /// Stop streaming, stop the fault monitor and release the device
    ///
    /// Returns once the monitor thread has exited.
    pub fn close(mut self) -> StreamResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> StreamResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let stopped = self.rx.issue_stream_cmd(&StreamCommand::stop_now());
        if let Err(e) = &stopped {
            warn!("Could not stop receive stream: {}", e);
        }

        match self.monitor.stop() {
            Some(MonitorExit::Stopped) | None => {}
            Some(MonitorExit::TransportFailed(e)) => {
                warn!("Fault monitor had already stopped: {}", e)
            }
            Some(MonitorExit::Panicked) => warn!("Fault monitor thread panicked"),
        }

        info!("Closed {}", self.devname);
        stopped
    }

    // Fault handler

    /// Replace the fault handler, returning the previous one
    pub fn set_fault_handler(
        &self,
        handler: Option<Arc<dyn FaultHandler>>,
    ) -> Option<Arc<dyn FaultHandler>> {
        self.faults.set(handler)
    }

    /// Register `handler` as the fault handler
    pub fn register_fault_handler<H: FaultHandler + 'static>(&self, handler: H) {
        self.faults.set(Some(Arc::new(handler)));
    }

    /// Stop reporting faults
    pub fn clear_fault_handler(&self) {
        self.faults.set(None);
    }

    // Streaming

    /// Receive into a single channel buffer
    pub fn recv(
        &mut self,
        buffer: &mut [Sample],
        nsamples: usize,
        blocking: bool,
    ) -> StreamResult<RxOutcome> {
        self.rx.recv(&mut [buffer], nsamples, blocking)
    }

    /// Receive into one buffer per receive channel
    pub fn recv_multi(
        &mut self,
        buffers: &mut [&mut [Sample]],
        nsamples: usize,
        blocking: bool,
    ) -> StreamResult<RxOutcome> {
        self.rx.recv(buffers, nsamples, blocking)
    }

    /// Send from a single buffer; other transmit channels carry zeros
    pub fn send_timed(
        &mut self,
        data: &[Sample],
        nsamples: usize,
        time_spec: Option<Timestamp>,
        blocking: bool,
        start_of_burst: bool,
        end_of_burst: bool,
    ) -> StreamResult<TxOutcome> {
        self.send_timed_multi(
            &[data],
            nsamples,
            time_spec,
            blocking,
            start_of_burst,
            end_of_burst,
        )
    }

    /// Send from up to one buffer per transmit channel
    pub fn send_timed_multi(
        &mut self,
        data: &[&[Sample]],
        nsamples: usize,
        time_spec: Option<Timestamp>,
        blocking: bool,
        start_of_burst: bool,
        end_of_burst: bool,
    ) -> StreamResult<TxOutcome> {
        self.tx.send(
            data,
            nsamples,
            time_spec,
            blocking,
            BurstFlags::new(start_of_burst, end_of_burst),
        )
    }

    /// Start continuous receive streaming shortly after the device's "now"
    pub fn start_rx_stream(&mut self) -> StreamResult<()> {
        let at = self.device.time_now()? + self.config.rx_start_delay()?;
        debug!("Starting receive stream at {}", at);
        self.rx.issue_stream_cmd(&StreamCommand::start_continuous_at(at))
    }

    pub fn stop_rx_stream(&mut self) -> StreamResult<()> {
        self.rx.issue_stream_cmd(&StreamCommand::stop_now())
    }

    /// Drain buffered receive samples; returns how many were discarded
    pub fn flush_rx(&mut self) -> usize {
        let mut scratch = vec![vec![Sample::default(); FLUSH_CHUNK_SAMPLES]; self.rx.num_channels()];
        let mut flushed = 0;
        loop {
            let mut buffers: Vec<&mut [Sample]> =
                scratch.iter_mut().map(|b| b.as_mut_slice()).collect();
            match self.rx.recv(&mut buffers, FLUSH_CHUNK_SAMPLES, false) {
                Ok(outcome) if outcome.samples > 0 => flushed += outcome.samples,
                _ => break,
            }
        }
        debug!("Flushed {} receive samples", flushed);
        flushed
    }

    // Device configuration

    /// Set every receive channel's rate; returns the rate read back
    pub fn set_rx_rate(&mut self, rate: f64) -> StreamResult<f64> {
        for chan in 0..self.rx.num_channels() {
            self.device.set_rx_rate(rate, chan)?;
        }
        Ok(self.device.rx_rate(0)?)
    }

    /// Set every transmit channel's rate; the rate read back drives time-spec advancement
    pub fn set_tx_rate(&mut self, rate: f64) -> StreamResult<f64> {
        for chan in 0..self.tx.num_channels() {
            self.device.set_tx_rate(rate, chan)?;
        }
        let actual = self.device.tx_rate(0)?;
        self.tx.set_rate(actual)?;
        Ok(actual)
    }

    pub fn set_rx_gain(&mut self, gain_db: f64) -> StreamResult<f64> {
        for chan in 0..self.rx.num_channels() {
            self.device.set_rx_gain(gain_db, chan)?;
        }
        self.rx_gain()
    }

    pub fn set_tx_gain(&mut self, gain_db: f64) -> StreamResult<f64> {
        for chan in 0..self.tx.num_channels() {
            self.device.set_tx_gain(gain_db, chan)?;
        }
        self.tx_gain()
    }

    pub fn rx_gain(&self) -> StreamResult<f64> {
        Ok(self.device.rx_gain(0)?)
    }

    pub fn tx_gain(&self) -> StreamResult<f64> {
        Ok(self.device.tx_gain(0)?)
    }

    pub fn set_rx_freq(&mut self, freq_hz: f64) -> StreamResult<f64> {
        for chan in 0..self.rx.num_channels() {
            self.device.set_rx_freq(freq_hz, chan)?;
        }
        Ok(self.device.rx_freq(0)?)
    }

    pub fn set_tx_freq(&mut self, freq_hz: f64) -> StreamResult<f64> {
        for chan in 0..self.tx.num_channels() {
            self.device.set_tx_freq(freq_hz, chan)?;
        }
        Ok(self.device.tx_freq(0)?)
    }

    /// Change the master clock rate; ignored when it was fixed at open
    pub fn set_master_clock_rate(&mut self, rate: f64) -> StreamResult<()> {
        if !self.dynamic_rate {
            debug!("Master clock rate is fixed, ignoring {}", rate);
            return Ok(());
        }
        Ok(self.device.set_master_clock_rate(rate)?)
    }

    pub fn is_master_clock_dynamic(&self) -> bool {
        self.dynamic_rate
    }

    /// Device clock
    pub fn time_now(&self) -> StreamResult<Timestamp> {
        Ok(self.device.time_now()?)
    }

    pub fn has_rssi(&self) -> bool {
        self.has_rssi
    }

    /// Receive signal strength in dBm, 0.0 on devices without the sensor
    pub fn rssi(&self) -> StreamResult<f64> {
        if !self.has_rssi {
            return Ok(0.0);
        }
        let value = self.device.rx_sensor("rssi", 0)?;
        value.to_real().ok_or_else(|| {
            StreamError::Hal(HalError::InvalidArgument(format!(
                "rssi sensor is not numeric: {:?}",
                value
            )))
        })
    }

    /// Wait for the reference clock to lock
    ///
    /// Devices without a `ref_locked` sensor are assumed locked after a short
    /// settling delay.
    pub fn wait_lo_locked(&self) -> StreamResult<bool> {
        let names = self.device.mboard_sensor_names()?;
        if !names.iter().any(|n| n.contains("ref_locked")) {
            thread::sleep(NO_LOCK_SENSOR_WAIT);
            return Ok(true);
        }

        let started = Instant::now();
        loop {
            let locked = self
                .device
                .mboard_sensor("ref_locked")?
                .to_bool()
                .unwrap_or(false);
            if locked {
                debug!("Reference locked after {:?}", started.elapsed());
                return Ok(true);
            }
            if started.elapsed() >= LOCK_TIMEOUT {
                warn!("Reference clock not locked after {:?}", LOCK_TIMEOUT);
                return Ok(false);
            }
            thread::sleep(LOCK_POLL);
        }
    }

    // Accessors

    pub fn device_name(&self) -> &'static str {
        self.devname
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn rx_channels(&self) -> usize {
        self.rx.num_channels()
    }

    pub fn tx_channels(&self) -> usize {
        self.tx.num_channels()
    }

    pub fn rx_max_burst(&self) -> usize {
        self.rx.max_burst()
    }

    pub fn tx_max_burst(&self) -> usize {
        self.tx.max_burst()
    }

    /// Transmit rate used for time-spec advancement
    pub fn tx_rate(&self) -> f64 {
        self.tx.rate()
    }

    /// Time-spec the next timed send without an explicit timestamp starts at
    pub fn tx_time_spec(&self) -> Timestamp {
        self.tx.metadata().time_spec
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// How the fault monitor ended, once it has been joined
    pub fn monitor_exit(&self) -> Option<&MonitorExit> {
        self.monitor.exit()
    }
}

impl<D: RadioDevice> Drop for StreamSession<D> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

impl<D: RadioDevice> std::fmt::Debug for StreamSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("devname", &self.devname)
            .field("rx_channels", &self.rx.num_channels())
            .field("tx_channels", &self.tx.num_channels())
            .field("tx_rate", &self.tx.rate())
            .field("faults", &self.faults)
            .field("monitor", &self.monitor)
            .field("closed", &self.closed)
            .finish()
    }
}
