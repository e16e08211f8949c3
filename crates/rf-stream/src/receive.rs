//! Receive engine
//!
//! Fills one caller buffer per channel. In blocking mode the engine keeps
//! asking the streamer for the outstanding deficit, writing each chunk right
//! after the previous one, until the request is satisfied or the attempt
//! budget is spent. The first chunk is received into a dedicated metadata
//! object so the reported time-spec is the time of the first sample of the
//! whole request.

use std::sync::Arc;
use std::time::Duration;

use rf_hal::{FaultKind, RxErrorCode, RxMetadata, RxStreamer, Sample, StreamCommand, Timestamp};
use tracing::{debug, error, warn};

use crate::config::RetryPolicy;
use crate::error::{StreamError, StreamResult};
use crate::faults::FaultSlot;
use crate::transfer::{Transfer, TransferReport};

/// Result of a receive call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxOutcome {
    /// Sample count returned to the caller (see [`RetryPolicy`])
    pub samples: usize,
    /// Device time of the first sample, when the hardware reported one
    pub time_spec: Option<Timestamp>,
    /// What actually happened
    pub report: TransferReport,
}

/// Drives a receive streamer
pub struct RxEngine<R> {
    streamer: R,
    md_first: RxMetadata,
    md: RxMetadata,
    num_channels: usize,
    timeout: Duration,
    max_attempts: u32,
    policy: RetryPolicy,
    faults: Arc<FaultSlot>,
}

impl<R: RxStreamer> RxEngine<R> {
    pub fn new(
        streamer: R,
        timeout: Duration,
        max_attempts: u32,
        policy: RetryPolicy,
        faults: Arc<FaultSlot>,
    ) -> Self {
        let num_channels = streamer.num_channels();
        Self {
            streamer,
            md_first: RxMetadata::new(),
            md: RxMetadata::new(),
            num_channels,
            timeout,
            max_attempts,
            policy,
            faults,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Hardware limit on samples per call
    pub fn max_burst(&self) -> usize {
        self.streamer.max_num_samps()
    }

    pub fn issue_stream_cmd(&mut self, cmd: &StreamCommand) -> StreamResult<()> {
        Ok(self.streamer.issue_stream_cmd(cmd)?)
    }

    /// Receive `nsamples` into each of the first `num_channels` buffers
    pub fn recv(
        &mut self,
        buffers: &mut [&mut [Sample]],
        nsamples: usize,
        blocking: bool,
    ) -> StreamResult<RxOutcome> {
        self.check_buffers(buffers, nsamples)?;
        let channels = &mut buffers[..self.num_channels];

        if !blocking {
            let mut views: Vec<&mut [Sample]> =
                channels.iter_mut().map(|b| &mut b[..nsamples]).collect();
            let got = match self
                .streamer
                .recv(&mut views, &mut self.md_first, Duration::ZERO)
            {
                Ok(n) => n.min(nsamples),
                Err(e) => {
                    error!("Error receiving from device: {}", e);
                    let mut transfer = Transfer::new(nsamples, 1);
                    return Err(StreamError::Transport {
                        source: e,
                        report: transfer.fail(),
                    });
                }
            };
            return Ok(RxOutcome {
                samples: got,
                time_spec: first_time_spec(&self.md_first),
                report: TransferReport::single(nsamples, got),
            });
        }

        let mut transfer = Transfer::new(nsamples, self.max_attempts);
        while transfer.is_accumulating() {
            let offset = transfer.delivered();
            let want = transfer.deficit();
            let mut views: Vec<&mut [Sample]> = channels
                .iter_mut()
                .map(|b| &mut b[offset..offset + want])
                .collect();

            let md = if transfer.attempts() == 0 {
                &mut self.md_first
            } else {
                &mut self.md
            };

            let got = match self.streamer.recv(&mut views, md, self.timeout) {
                Ok(n) => n,
                Err(e) => {
                    error!("Error receiving from device: {}", e);
                    return Err(StreamError::Transport {
                        source: e,
                        report: transfer.fail(),
                    });
                }
            };
            let code = md.error_code;
            transfer.record(got);
            self.check_error_code(code);
        }

        let report = transfer.report();
        if !report.is_complete() {
            warn!(
                "Receive gave up after {} attempts with {} of {} samples",
                report.attempts, report.delivered, report.requested
            );
        } else {
            debug!(
                "Received {} samples in {} attempts",
                report.delivered, report.attempts
            );
        }

        Ok(RxOutcome {
            samples: transfer.reported_count(self.policy)?,
            time_spec: first_time_spec(&self.md_first),
            report,
        })
    }

    /// Classify the error code of the call that just returned
    fn check_error_code(&self, code: RxErrorCode) {
        match code {
            RxErrorCode::None => {}
            RxErrorCode::Overflow => self.faults.report(FaultKind::Overflow),
            RxErrorCode::LateCommand => self.faults.report(FaultKind::Late),
            other => warn!(
                "Error code {:?} (0x{:x}) was returned during streaming",
                other,
                other.raw()
            ),
        }
    }

    fn check_buffers(&self, buffers: &[&mut [Sample]], nsamples: usize) -> StreamResult<()> {
        if buffers.len() < self.num_channels {
            return Err(StreamError::ChannelCount {
                expected: self.num_channels,
                actual: buffers.len(),
            });
        }
        for (channel, buffer) in buffers.iter().take(self.num_channels).enumerate() {
            if buffer.len() < nsamples {
                return Err(StreamError::BufferTooShort {
                    channel,
                    len: buffer.len(),
                    needed: nsamples,
                });
            }
        }
        Ok(())
    }
}

fn first_time_spec(md: &RxMetadata) -> Option<Timestamp> {
    md.has_time_spec.then_some(md.time_spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_hal::{FaultCounters, HalError, HalResult};
    use std::collections::VecDeque;

    /// One scripted hardware response
    enum Step {
        Deliver(usize, RxErrorCode),
        Fail,
    }

    /// Streamer that replays a script; sample values count up from zero
    struct ScriptedRx {
        channels: usize,
        script: VecDeque<Step>,
        next_value: f32,
        calls: Vec<(usize, Duration)>,
    }

    impl ScriptedRx {
        fn new(channels: usize, script: Vec<Step>) -> Self {
            Self {
                channels,
                script: script.into(),
                next_value: 0.0,
                calls: Vec::new(),
            }
        }
    }

    impl RxStreamer for ScriptedRx {
        fn num_channels(&self) -> usize {
            self.channels
        }

        fn max_num_samps(&self) -> usize {
            2000
        }

        fn recv(
            &mut self,
            buffs: &mut [&mut [Sample]],
            md: &mut RxMetadata,
            timeout: Duration,
        ) -> HalResult<usize> {
            let requested = buffs[0].len();
            self.calls.push((requested, timeout));
            let (n, code) = match self.script.pop_front() {
                Some(Step::Deliver(n, code)) => (n.min(requested), code),
                Some(Step::Fail) => return Err(HalError::transport(-1, "scripted")),
                None => (requested, RxErrorCode::None),
            };
            for i in 0..n {
                for (ch, buf) in buffs.iter_mut().enumerate() {
                    buf[i] = Sample::new(self.next_value, ch as f32);
                }
                self.next_value += 1.0;
            }
            *md = RxMetadata {
                has_time_spec: true,
                time_spec: Timestamp::new(self.calls.len() as i64, 0.0),
                error_code: code,
                ..Default::default()
            };
            Ok(n)
        }

        fn issue_stream_cmd(&mut self, _cmd: &StreamCommand) -> HalResult<()> {
            Ok(())
        }
    }

    fn engine(rx: ScriptedRx, policy: RetryPolicy) -> (RxEngine<ScriptedRx>, Arc<FaultCounters>) {
        let faults = Arc::new(FaultSlot::new());
        let counters = Arc::new(FaultCounters::new());
        faults.set(Some(counters.clone()));
        (
            RxEngine::new(rx, Duration::from_secs(1), 100, policy, faults),
            counters,
        )
    }

    #[test]
    fn test_blocking_assembles_chunks_contiguously() {
        let rx = ScriptedRx::new(
            2,
            vec![
                Step::Deliver(300, RxErrorCode::None),
                Step::Deliver(300, RxErrorCode::None),
                Step::Deliver(300, RxErrorCode::None),
            ],
        );
        let (mut eng, _) = engine(rx, RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 1000];
        let mut b = vec![Sample::default(); 1000];

        let out = eng.recv(&mut [&mut a[..], &mut b[..]], 1000, true).unwrap();

        assert_eq!(out.samples, 1000);
        assert_eq!(out.report.attempts, 4);
        for (i, s) in a.iter().enumerate() {
            assert_eq!(s.re, i as f32);
        }
        assert!(b.iter().all(|s| s.im == 1.0));
        // Each call asks for the remaining deficit
        let asked: Vec<usize> = eng.streamer.calls.iter().map(|c| c.0).collect();
        assert_eq!(asked, vec![1000, 700, 400, 100]);
    }

    #[test]
    fn test_time_spec_comes_from_first_chunk() {
        let rx = ScriptedRx::new(1, vec![Step::Deliver(10, RxErrorCode::None)]);
        let (mut eng, _) = engine(rx, RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 50];

        let out = eng.recv(&mut [&mut a[..]], 50, true).unwrap();
        assert_eq!(out.report.attempts, 2);
        assert_eq!(out.time_spec, Some(Timestamp::new(1, 0.0)));
    }

    #[test]
    fn test_non_blocking_single_call() {
        let rx = ScriptedRx::new(1, vec![Step::Deliver(40, RxErrorCode::None)]);
        let (mut eng, _) = engine(rx, RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 100];

        let out = eng.recv(&mut [&mut a[..]], 100, false).unwrap();
        assert_eq!(out.samples, 40);
        assert_eq!(eng.streamer.calls, vec![(100, Duration::ZERO)]);
    }

    #[test]
    fn test_overflow_and_late_are_reported_without_aborting() {
        let rx = ScriptedRx::new(
            1,
            vec![
                Step::Deliver(10, RxErrorCode::Overflow),
                Step::Deliver(10, RxErrorCode::LateCommand),
                Step::Deliver(10, RxErrorCode::Timeout),
            ],
        );
        let (mut eng, counters) = engine(rx, RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 100];

        let out = eng.recv(&mut [&mut a[..]], 100, true).unwrap();
        assert!(out.report.is_complete());
        assert_eq!(counters.get(FaultKind::Overflow), 1);
        assert_eq!(counters.get(FaultKind::Late), 1);
        assert_eq!(counters.get(FaultKind::Underflow), 0);
    }

    #[test]
    fn test_overflow_on_first_chunk_is_seen() {
        let rx = ScriptedRx::new(1, vec![Step::Deliver(100, RxErrorCode::Overflow)]);
        let (mut eng, counters) = engine(rx, RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 100];

        eng.recv(&mut [&mut a[..]], 100, true).unwrap();
        assert_eq!(counters.get(FaultKind::Overflow), 1);
    }

    #[test]
    fn test_transport_failure_aborts() {
        let rx = ScriptedRx::new(
            1,
            vec![Step::Deliver(10, RxErrorCode::None), Step::Fail],
        );
        let (mut eng, _) = engine(rx, RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 100];

        match eng.recv(&mut [&mut a[..]], 100, true) {
            Err(StreamError::Transport { report, .. }) => {
                assert_eq!(report.delivered, 10);
                assert_eq!(report.attempts, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(eng.streamer.calls.len(), 2);
    }

    #[test]
    fn test_retry_exhaustion_policies() {
        let starve = || ScriptedRx::new(1, (0..100).map(|_| Step::Deliver(1, RxErrorCode::Timeout)).collect());
        let mut a = vec![Sample::default(); 500];

        let (mut legacy, _) = engine(starve(), RetryPolicy::Legacy);
        let out = legacy.recv(&mut [&mut a[..]], 500, true).unwrap();
        assert_eq!(out.samples, 500);
        assert_eq!(out.report.delivered, 100);
        assert_eq!(out.report.attempts, 100);

        let (mut strict, _) = engine(starve(), RetryPolicy::Strict);
        assert!(matches!(
            strict.recv(&mut [&mut a[..]], 500, true),
            Err(StreamError::RetryExhausted { delivered: 100, .. })
        ));
    }

    #[test]
    fn test_rejects_missing_channel_buffer() {
        let (mut eng, _) = engine(ScriptedRx::new(2, vec![]), RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 10];
        assert!(matches!(
            eng.recv(&mut [&mut a[..]], 10, true),
            Err(StreamError::ChannelCount { expected: 2, actual: 1 })
        ));
        assert!(eng.streamer.calls.is_empty());
    }

    #[test]
    fn test_rejects_short_buffer() {
        let (mut eng, _) = engine(ScriptedRx::new(1, vec![]), RetryPolicy::Legacy);
        let mut a = vec![Sample::default(); 10];
        assert!(matches!(
            eng.recv(&mut [&mut a[..]], 20, true),
            Err(StreamError::BufferTooShort { channel: 0, .. })
        ));
    }
}
