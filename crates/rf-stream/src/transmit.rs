//! Transmit engine
//!
//! Splits a send into chunks no larger than the streamer's burst limit. Only
//! the first chunk may carry start-of-burst and only the last may carry
//! end-of-burst. After every chunk the shared metadata's time-spec moves
//! forward by the duration of the samples accepted, so a timed burst stays
//! contiguous however it is chunked.

use std::sync::Arc;
use std::time::Duration;

use rf_hal::{Sample, Timestamp, TxMetadata, TxStreamer};
use tracing::{debug, error, warn};

use crate::config::RetryPolicy;
use crate::error::{StreamError, StreamResult};
use crate::transfer::{Transfer, TransferReport};

/// Result of a send call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxOutcome {
    /// Sample count returned to the caller (see [`RetryPolicy`])
    pub samples: usize,
    /// Time-spec the next send would start at
    pub next_time_spec: Timestamp,
    /// What actually happened
    pub report: TransferReport,
}

/// Burst framing requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BurstFlags {
    pub start_of_burst: bool,
    pub end_of_burst: bool,
}

impl BurstFlags {
    /// A complete burst in a single call
    pub fn whole() -> Self {
        Self {
            start_of_burst: true,
            end_of_burst: true,
        }
    }

    pub fn new(start_of_burst: bool, end_of_burst: bool) -> Self {
        Self {
            start_of_burst,
            end_of_burst,
        }
    }
}

/// Drives a transmit streamer
pub struct TxEngine<T> {
    streamer: T,
    md: TxMetadata,
    num_channels: usize,
    max_burst: usize,
    rate: f64,
    /// Read-only after construction
    zeros: Arc<[Sample]>,
    timeout: Duration,
    max_attempts: u32,
    policy: RetryPolicy,
}

impl<T: TxStreamer> TxEngine<T> {
    pub fn new(
        streamer: T,
        rate: f64,
        zero_pad_samples: usize,
        timeout: Duration,
        max_attempts: u32,
        policy: RetryPolicy,
    ) -> StreamResult<Self> {
        let max_burst = streamer.max_num_samps();
        if max_burst == 0 {
            return Err(StreamError::Config(
                "transmit streamer reports a burst limit of zero samples".into(),
            ));
        }
        check_rate(rate)?;
        let num_channels = streamer.num_channels();
        let zeros: Arc<[Sample]> = vec![Sample::default(); zero_pad_samples.max(max_burst)].into();

        Ok(Self {
            streamer,
            md: TxMetadata::new(),
            num_channels,
            max_burst,
            rate,
            zeros,
            timeout,
            max_attempts,
            policy,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Hardware limit on samples per call
    pub fn max_burst(&self) -> usize {
        self.max_burst
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Rate used to advance the time-spec
    pub fn set_rate(&mut self, rate: f64) -> StreamResult<()> {
        check_rate(rate)?;
        self.rate = rate;
        Ok(())
    }

    pub fn metadata(&self) -> &TxMetadata {
        &self.md
    }

    /// Send `nsamples` from each caller buffer; missing channels are zero-padded
    pub fn send(
        &mut self,
        data: &[&[Sample]],
        nsamples: usize,
        time_spec: Option<Timestamp>,
        blocking: bool,
        flags: BurstFlags,
    ) -> StreamResult<TxOutcome> {
        self.check_buffers(data, nsamples)?;

        if let Some(t) = time_spec {
            self.md.set_time_spec(t);
        }

        if !blocking {
            self.md.set_start(flags.start_of_burst);
            self.md.set_end(flags.end_of_burst);

            let scratch: Vec<Sample>;
            let pad: &[Sample] = if nsamples <= self.zeros.len() {
                &self.zeros[..nsamples]
            } else {
                scratch = vec![Sample::default(); nsamples];
                &scratch
            };
            let buffs = channel_set(data, pad, 0, nsamples, self.num_channels);

            let sent = match self.streamer.send(&buffs, &self.md, Duration::ZERO) {
                Ok(n) => n.min(nsamples),
                Err(e) => {
                    error!("Error sending to device: {}", e);
                    let mut transfer = Transfer::new(nsamples, 1);
                    return Err(StreamError::Transport {
                        source: e,
                        report: transfer.fail(),
                    });
                }
            };
            return Ok(TxOutcome {
                samples: sent,
                next_time_spec: self.md.time_spec,
                report: TransferReport::single(nsamples, sent),
            });
        }

        let mut transfer = Transfer::new(nsamples, self.max_attempts);
        while transfer.is_accumulating() {
            let offset = transfer.delivered();
            let remaining = transfer.deficit();

            // Start of burst only until the first samples have gone out
            self.md.set_start(offset == 0 && flags.start_of_burst);

            // Middle chunks are never end of burst
            let chunk = if remaining > self.max_burst {
                self.md.set_end(false);
                self.max_burst
            } else {
                self.md.set_end(flags.end_of_burst);
                remaining
            };

            let buffs = channel_set(data, &self.zeros[..chunk], offset, chunk, self.num_channels);
            let sent = match self.streamer.send(&buffs, &self.md, self.timeout) {
                Ok(n) => n.min(chunk),
                Err(e) => {
                    error!("Error sending to device: {}", e);
                    return Err(StreamError::Transport {
                        source: e,
                        report: transfer.fail(),
                    });
                }
            };

            self.md.add_time_spec(sent as f64 / self.rate);
            transfer.record(sent);
        }

        let report = transfer.report();
        if !report.is_complete() {
            warn!(
                "Send gave up after {} attempts with {} of {} samples",
                report.attempts, report.delivered, report.requested
            );
        } else {
            debug!("Sent {} samples in {} chunks", report.delivered, report.attempts);
        }

        Ok(TxOutcome {
            samples: transfer.reported_count(self.policy)?,
            next_time_spec: self.md.time_spec,
            report,
        })
    }

    fn check_buffers(&self, data: &[&[Sample]], nsamples: usize) -> StreamResult<()> {
        if data.is_empty() || data.len() > self.num_channels {
            return Err(StreamError::ChannelCount {
                expected: self.num_channels,
                actual: data.len(),
            });
        }
        for (channel, buffer) in data.iter().enumerate() {
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

/// One slice per streamer channel: caller data where given, zeros elsewhere
fn channel_set<'a>(
    data: &[&'a [Sample]],
    pad: &'a [Sample],
    offset: usize,
    len: usize,
    num_channels: usize,
) -> Vec<&'a [Sample]> {
    (0..num_channels)
        .map(|ch| match data.get(ch) {
            Some(buf) => &buf[offset..offset + len],
            None => pad,
        })
        .collect()
}

fn check_rate(rate: f64) -> StreamResult<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(StreamError::Config(format!(
            "transmit rate must be positive, got {rate}"
        )))
    }
}
