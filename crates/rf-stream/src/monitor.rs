//! Background fault monitor
//!
//! A dedicated thread polls the transmit path's asynchronous event channel
//! and turns underflow and timing events into faults. The poll timeout bounds
//! how long [`FaultMonitor::stop`] waits for the thread to notice the stop
//! request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rf_hal::{AsyncEventCode, AsyncEventSource, FaultKind, HalError};
use tracing::{debug, error, info, trace};

use crate::faults::FaultSlot;

/// Name of the monitor thread
pub const MONITOR_THREAD_NAME: &str = "rf-fault-monitor";

/// Fault raised by an asynchronous transmit event, if any
pub fn classify(code: AsyncEventCode) -> Option<FaultKind> {
    match code {
        AsyncEventCode::Underflow | AsyncEventCode::UnderflowInPacket => Some(FaultKind::Underflow),
        AsyncEventCode::TimeError => Some(FaultKind::Late),
        AsyncEventCode::BurstAck
        | AsyncEventCode::SeqError
        | AsyncEventCode::SeqErrorInBurst
        | AsyncEventCode::UserPayload => None,
    }
}

/// How the monitor thread ended
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorExit {
    /// Stop was requested
    Stopped,
    /// The event channel failed; no further events were observed
    TransportFailed(HalError),
    /// The thread panicked (most likely inside a fault handler)
    Panicked,
}

/// Handle to the monitor thread
#[derive(Debug)]
pub struct FaultMonitor {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<MonitorExit>>,
    exit: Option<MonitorExit>,
}

impl FaultMonitor {
    /// Start polling `events` every `poll`
    pub fn spawn<E>(events: E, faults: Arc<FaultSlot>, poll: Duration) -> std::io::Result<Self>
    where
        E: AsyncEventSource + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name(MONITOR_THREAD_NAME.into())
            .spawn(move || run(events, faults, flag, poll))?;

        debug!("Fault monitor started, polling every {:?}", poll);
        Ok(Self {
            running,
            handle: Some(handle),
            exit: None,
        })
    }

    /// Whether the thread is still polling
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Exit status, once the thread has been joined
    pub fn exit(&self) -> Option<&MonitorExit> {
        self.exit.as_ref()
    }

    /// Ask the thread to stop and wait for it
    ///
    /// Returns within roughly one poll interval. Calling it again is a no-op.
    pub fn stop(&mut self) -> Option<&MonitorExit> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let exit = handle.join().unwrap_or(MonitorExit::Panicked);
            debug!("Fault monitor joined: {:?}", exit);
            self.exit = Some(exit);
        }
        self.exit.as_ref()
    }
}

impl Drop for FaultMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<E: AsyncEventSource>(
    mut events: E,
    faults: Arc<FaultSlot>,
    running: Arc<AtomicBool>,
    poll: Duration,
) -> MonitorExit {
    while running.load(Ordering::SeqCst) {
        match events.recv_async_msg(poll) {
            Ok(Some(event)) => {
                trace!(
                    "Async event {:?} on channel {}",
                    event.event_code,
                    event.channel
                );
                if let Some(kind) = classify(event.event_code) {
                    faults.report(kind);
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Fault monitor stopped, event channel failed: {}", e);
                return MonitorExit::TransportFailed(e);
            }
        }
    }
    info!("Fault monitor exiting");
    MonitorExit::Stopped
}
