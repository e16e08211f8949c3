//! Published fault handler
//!
//! The handler is written by configuration calls on the foreground thread and
//! read by both the receive engine and the fault monitor thread. Readers clone
//! the `Arc` under the read lock and invoke the handler after releasing it, so
//! a handler may re-register itself without deadlocking.

use std::sync::Arc;

use parking_lot::RwLock;
use rf_hal::{FaultHandler, FaultKind, FaultRecord};
use tracing::{debug, trace};

/// Shared slot holding at most one fault handler
#[derive(Default)]
pub struct FaultSlot {
    handler: RwLock<Option<Arc<dyn FaultHandler>>>,
}

impl FaultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the handler, returning the previous one
    ///
    /// `None` disables reporting; faults raised afterwards are dropped.
    pub fn set(&self, handler: Option<Arc<dyn FaultHandler>>) -> Option<Arc<dyn FaultHandler>> {
        std::mem::replace(&mut *self.handler.write(), handler)
    }

    pub fn is_set(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Deliver a fault to the current handler, if any
    pub fn report(&self, kind: FaultKind) {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => {
                debug!("Reporting {} fault", kind.name());
                handler.on_fault(FaultRecord::new(kind));
            }
            None => trace!("Dropping {} fault: no handler registered", kind.name()),
        }
    }
}

impl std::fmt::Debug for FaultSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultSlot")
            .field("registered", &self.is_set())
            .finish()
    }
}
