//! Simulated Radio Device
//!
//! This crate provides an in-process implementation of the [`rf_hal`]
//! provider traits for testing the streaming engine without hardware:
//!
//! - **SimDevice**: device clock, per-channel rate/gain/frequency state and
//!   `ref_locked` / `rssi` sensors
//! - **SimRxStreamer**: delivers a deterministic sample ramp, optionally in
//!   short chunks, with scripted error codes and transport failures
//! - **SimTxStreamer**: records every send call and can accept partial chunks
//! - **SimEventQueue**: the asynchronous event queue, fed by the transmit
//!   streamer and by [`SimHandle`] injections
//!
//! Receive sample `k` on channel `c` is `Complex32::new(k as f32, c as f32)`,
//! so tests can check that chunks land contiguously.
//!
//! # Example
//!
//! ```rust
//! use rf_hal::{AsyncEventCode, AsyncEventSource, RadioDevice, StreamArgs};
//! use rf_sim::{SimDevice, SimDeviceConfig};
//! use std::time::Duration;
//!
//! let mut device = SimDevice::new(SimDeviceConfig::default());
//! let handle = device.handle();
//! let (_tx, mut events) = device.tx_stream(&StreamArgs::fc32(1)).unwrap();
//!
//! handle.inject_event(AsyncEventCode::Underflow);
//! let event = events.recv_async_msg(Duration::from_millis(10)).unwrap();
//! assert_eq!(event.map(|e| e.event_code), Some(AsyncEventCode::Underflow));
//! ```

pub mod device;
pub mod events;
pub mod streamer;

pub use device::{SimDevice, SimDeviceConfig, SimFactory, SimHandle};
pub use events::SimEventQueue;
pub use streamer::{RxStep, SimRxStreamer, SimTxStreamer, TxRecord};
