//! Fault taxonomy and fault handlers
//!
//! Faults are purely observational: they are reported to a handler and never
//! abort the streaming call in progress. Receive faults are reported inline by
//! the foreground caller; transmit faults arrive from a background monitor
//! thread, so handlers must be `Send + Sync`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of streaming fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FaultKind {
    /// Receive samples were dropped because the host fell behind
    Overflow,
    /// A command or packet was scheduled at a time already in the past
    Late,
    /// The transmitter ran out of samples mid-burst
    Underflow,
}

impl FaultKind {
    /// Returns a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            FaultKind::Overflow => "overflow",
            FaultKind::Late => "late",
            FaultKind::Underflow => "underflow",
        }
    }
}

/// A fault delivered to a [`FaultHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultRecord {
    pub kind: FaultKind,
}

impl FaultRecord {
    pub fn new(kind: FaultKind) -> Self {
        Self { kind }
    }

    pub fn overflow() -> Self {
        Self::new(FaultKind::Overflow)
    }

    pub fn late() -> Self {
        Self::new(FaultKind::Late)
    }

    pub fn underflow() -> Self {
        Self::new(FaultKind::Underflow)
    }
}

impl std::fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind.name())
    }
}

/// Receiver of streaming faults
///
/// Called from both the streaming thread and the fault monitor thread. Calls
/// should return quickly; a slow handler delays the receive loop or the next
/// monitor poll.
pub trait FaultHandler: Send + Sync {
    fn on_fault(&self, fault: FaultRecord);
}

impl<F> FaultHandler for F
where
    F: Fn(FaultRecord) + Send + Sync,
{
    fn on_fault(&self, fault: FaultRecord) {
        self(fault)
    }
}

/// Forward faults into a std channel, dropping them once the receiver is gone
pub fn channel_handler(tx: std::sync::mpsc::Sender<FaultRecord>) -> impl FaultHandler {
    move |fault: FaultRecord| {
        let _ = tx.send(fault);
    }
}

/// Forward faults into a tokio unbounded channel
#[cfg(feature = "tokio")]
pub fn tokio_handler(tx: tokio::sync::mpsc::UnboundedSender<FaultRecord>) -> impl FaultHandler {
    move |fault: FaultRecord| {
        let _ = tx.send(fault);
    }
}

/// Broadcast faults to every tokio subscriber
#[cfg(feature = "tokio")]
pub fn broadcast_handler(tx: tokio::sync::broadcast::Sender<FaultRecord>) -> impl FaultHandler {
    move |fault: FaultRecord| {
        let _ = tx.send(fault);
    }
}

/// Counts faults by kind
///
/// Register an `Arc<FaultCounters>` as the handler and read it from anywhere.
#[derive(Debug, Default)]
pub struct FaultCounters {
    overflow: AtomicU64,
    late: AtomicU64,
    underflow: AtomicU64,
}

/// Point-in-time copy of [`FaultCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultCounts {
    pub overflow: u64,
    pub late: u64,
    pub underflow: u64,
}

impl FaultCounts {
    pub fn total(&self) -> u64 {
        self.overflow + self.late + self.underflow
    }
}

impl FaultCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for a single kind
    pub fn get(&self, kind: FaultKind) -> u64 {
        self.counter(kind).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FaultCounts {
        FaultCounts {
            overflow: self.get(FaultKind::Overflow),
            late: self.get(FaultKind::Late),
            underflow: self.get(FaultKind::Underflow),
        }
    }

    fn counter(&self, kind: FaultKind) -> &AtomicU64 {
        match kind {
            FaultKind::Overflow => &self.overflow,
            FaultKind::Late => &self.late,
            FaultKind::Underflow => &self.underflow,
        }
    }
}

impl FaultHandler for FaultCounters {
    fn on_fault(&self, fault: FaultRecord) {
        self.counter(fault.kind).fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |fault: FaultRecord| sink.lock().unwrap().push(fault.kind);

        handler.on_fault(FaultRecord::overflow());
        handler.on_fault(FaultRecord::late());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![FaultKind::Overflow, FaultKind::Late]
        );
    }

    #[test]
    fn test_counters() {
        let counters = FaultCounters::new();
        counters.on_fault(FaultRecord::underflow());
        counters.on_fault(FaultRecord::underflow());
        counters.on_fault(FaultRecord::overflow());

        let snap = counters.snapshot();
        assert_eq!(snap.underflow, 2);
        assert_eq!(snap.overflow, 1);
        assert_eq!(snap.late, 0);
        assert_eq!(snap.total(), 3);
    }

    #[test]
    fn test_counters_behind_trait_object() {
        let counters = Arc::new(FaultCounters::new());
        let handler: Arc<dyn FaultHandler> = counters.clone();
        handler.on_fault(FaultRecord::late());
        assert_eq!(counters.get(FaultKind::Late), 1);
    }

    #[test]
    fn test_channel_handler_survives_dropped_receiver() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handler = channel_handler(tx);
        handler.on_fault(FaultRecord::underflow());
        assert_eq!(rx.recv().unwrap(), FaultRecord::underflow());

        drop(rx);
        handler.on_fault(FaultRecord::late());
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn test_tokio_handler() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler = tokio_handler(tx);
        handler.on_fault(FaultRecord::late());
        assert_eq!(rx.try_recv().unwrap(), FaultRecord::late());
    }

    #[test]
    fn test_display() {
        assert_eq!(FaultRecord::underflow().to_string(), "underflow");
    }
}
