//! Simulated sample streamers

use std::time::Duration;

use rf_hal::{
    AsyncEvent, AsyncEventCode, HalError, HalResult, RxErrorCode, RxMetadata, RxStreamer, Sample,
    StreamCommand, StreamMode, Timestamp, TxMetadata, TxStreamer,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::device::Shared;
use crate::events::EventSender;

/// Scripted behavior for the next receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxStep {
    /// Deliver normally but report this error code
    Code(RxErrorCode),
    /// Deliver at most this many samples
    Short(usize),
    /// Fail the call with a transport error
    Fail,
}

/// One recorded send call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxRecord {
    /// Samples offered per channel
    pub len: usize,
    /// Samples accepted
    pub accepted: usize,
    /// Channel buffers passed
    pub channels: usize,
    /// Channels whose buffer was all zeros
    pub zero_channels: usize,
    pub time_spec: Option<Timestamp>,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
    /// Real part of the first sample on channel 0
    pub first_re: Option<f32>,
}

/// Receive streamer producing a sample ramp
#[derive(Debug)]
pub struct SimRxStreamer {
    state: Shared,
    channels: usize,
    max_samps: usize,
    chunk: Option<usize>,
    next_sample: u64,
}

impl SimRxStreamer {
    pub(crate) fn new(state: Shared, channels: usize, max_samps: usize, chunk: Option<usize>) -> Self {
        Self {
            state,
            channels,
            max_samps,
            chunk,
            next_sample: 0,
        }
    }

    /// Index of the next sample the ramp will produce
    pub fn next_sample(&self) -> u64 {
        self.next_sample
    }
}

impl RxStreamer for SimRxStreamer {
    fn num_channels(&self) -> usize {
        self.channels
    }

    fn max_num_samps(&self) -> usize {
        self.max_samps
    }

    fn recv(
        &mut self,
        buffs: &mut [&mut [Sample]],
        md: &mut RxMetadata,
        timeout: Duration,
    ) -> HalResult<usize> {
        let mut state = self.state.lock();
        state.rx_calls += 1;

        let want = buffs.first().map_or(0, |b| b.len());
        let mut limit = want.min(self.max_samps);
        if let Some(chunk) = self.chunk {
            limit = limit.min(chunk);
        }

        let mut code = RxErrorCode::None;
        match state.rx_script.pop_front() {
            Some(RxStep::Fail) => {
                debug!("Simulated receive failure");
                return Err(HalError::transport(-1, "simulated receive failure"));
            }
            Some(RxStep::Code(c)) => code = c,
            Some(RxStep::Short(n)) => limit = limit.min(n),
            None => {}
        }

        if timeout.is_zero() {
            // Non-blocking calls only see what is already buffered
            limit = limit.min(state.rx_backlog);
            state.rx_backlog -= limit;
        } else if !state.streaming {
            limit = 0;
            if code == RxErrorCode::None {
                code = RxErrorCode::Timeout;
            }
        }
        let rate = state.rx_rate[0];
        drop(state);

        for (ch, buf) in buffs.iter_mut().enumerate() {
            let n = limit.min(buf.len());
            for (i, s) in buf[..n].iter_mut().enumerate() {
                *s = Sample::new((self.next_sample + i as u64) as f32, ch as f32);
            }
        }

        *md = RxMetadata {
            has_time_spec: true,
            time_spec: Timestamp::ZERO.after_samples(self.next_sample as usize, rate),
            error_code: code,
            ..RxMetadata::new()
        };
        self.next_sample += limit as u64;

        trace!("Simulated receive of {} samples ({:?})", limit, code);
        Ok(limit)
    }

    fn issue_stream_cmd(&mut self, cmd: &StreamCommand) -> HalResult<()> {
        let mut state = self.state.lock();
        state.streaming = !matches!(cmd.mode, StreamMode::StopContinuous);
        state.stream_cmds.push(*cmd);
        debug!("Stream command {:?}", cmd.mode);
        Ok(())
    }
}

/// Transmit streamer recording every call
#[derive(Debug)]
pub struct SimTxStreamer {
    state: Shared,
    events: EventSender,
    channels: usize,
    max_samps: usize,
    accept: Option<usize>,
    underflow_every: Option<usize>,
}

impl SimTxStreamer {
    pub(crate) fn new(
        state: Shared,
        events: EventSender,
        channels: usize,
        max_samps: usize,
        accept: Option<usize>,
        underflow_every: Option<usize>,
    ) -> Self {
        Self {
            state,
            events,
            channels,
            max_samps,
            accept,
            underflow_every,
        }
    }

    fn emit(&self, code: AsyncEventCode, time_spec: Timestamp) {
        let event = AsyncEvent {
            time_spec: Some(time_spec),
            ..AsyncEvent::new(code)
        };
        // Nobody polling is not an error
        let _ = self.events.send(Ok(event));
    }
}

impl TxStreamer for SimTxStreamer {
    fn num_channels(&self) -> usize {
        self.channels
    }

    fn max_num_samps(&self) -> usize {
        self.max_samps
    }

    fn send(
        &mut self,
        buffs: &[&[Sample]],
        md: &TxMetadata,
        _timeout: Duration,
    ) -> HalResult<usize> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.tx_fail_next) {
            debug!("Simulated send failure");
            return Err(HalError::transport(-1, "simulated send failure"));
        }

        let len = buffs.first().map_or(0, |b| b.len());
        let accepted = self
            .accept
            .map_or(len, |limit| limit.min(len))
            .min(self.max_samps);

        state.tx_log.push(TxRecord {
            len,
            accepted,
            channels: buffs.len(),
            zero_channels: buffs
                .iter()
                .filter(|b| b.iter().all(|s| *s == Sample::default()))
                .count(),
            time_spec: md.has_time_spec.then_some(md.time_spec),
            start_of_burst: md.start_of_burst,
            end_of_burst: md.end_of_burst,
            first_re: buffs.first().and_then(|b| b.first()).map(|s| s.re),
        });

        if md.start_of_burst && md.has_time_spec && md.time_spec < state.now() {
            self.emit(AsyncEventCode::TimeError, md.time_spec);
        }

        if md.end_of_burst && accepted == len {
            state.bursts_ended += 1;
            let underflow = self
                .underflow_every
                .is_some_and(|n| n > 0 && state.bursts_ended % n == 0);
            let code = if underflow {
                AsyncEventCode::Underflow
            } else {
                AsyncEventCode::BurstAck
            };
            let rate = state.tx_rate[0];
            self.emit(code, md.time_spec.after_samples(accepted, rate));
        }

        trace!("Simulated send of {}/{} samples", accepted, len);
        Ok(accepted)
    }
}
