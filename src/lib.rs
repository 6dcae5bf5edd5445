//! Keeps Elite Dangerous in step with a physical HOTAS
//!
//! Physical switches say what the pilot wants; the game's status file says
//! what the ship is doing. [`sync::SyncEngine`] polls the status file,
//! presses virtual toggle buttons when the two disagree for longer than a
//! cooldown, and shapes lever and pedal axes onto the virtual joystick.

pub mod clock;
pub mod config;
pub mod controller;
pub mod device;
pub mod shaping;
pub mod status;
pub mod sync;
pub mod toggle;
