//! Orchestration: status polling, feature reconciliation and analog outputs

pub mod bindings;
pub mod engine;
pub mod service;

pub use bindings::{AnalogRule, AnalogSource, ModeGate};
pub use engine::{Handler, SharedStatusFeed, SyncEngine};
pub use service::{ServiceError, ServiceState, SyncService, SyncServiceHandle};
