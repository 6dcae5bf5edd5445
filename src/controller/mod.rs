//! Physical device input
//!
//! # Architecture
//!
//! ```text
//! gilrs ──► EventCollector (own thread) ──► mpsc<HostEvent> ──► SyncService
//! ```

pub mod event_collector;

pub use event_collector::{seed_events, CollectorError, CollectorHandle, CollectorSettings};

use crate::device::InputId;

/// A change on a physical device, as delivered to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Axis { input: InputId, value: f64 },
    Button { input: InputId, pressed: bool },
}
