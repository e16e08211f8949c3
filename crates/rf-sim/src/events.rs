//! Simulated asynchronous event queue

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use rf_hal::{AsyncEvent, AsyncEventSource, HalResult};
use tracing::trace;

/// Sending half of the event queue; an `Err` makes the next poll fail
pub(crate) type EventSender = Sender<HalResult<AsyncEvent>>;

pub(crate) fn event_queue() -> (EventSender, SimEventQueue) {
    let (tx, rx) = mpsc::channel();
    (tx, SimEventQueue { rx })
}

/// Asynchronous transmit events of a [`SimDevice`](crate::SimDevice)
#[derive(Debug)]
pub struct SimEventQueue {
    rx: Receiver<HalResult<AsyncEvent>>,
}

impl AsyncEventSource for SimEventQueue {
    fn recv_async_msg(&mut self, timeout: Duration) -> HalResult<Option<AsyncEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                trace!("Delivering async event {:?}", event.event_code);
                Ok(Some(event))
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // Every sender is gone; behave like an idle queue
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
