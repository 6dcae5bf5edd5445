//! Device-facing capability traits
//!
//! The sync core never talks to hardware directly. It reads physical inputs
//! through [`InputSource`] and writes the virtual joystick through
//! [`OutputSink`]; the host wires real devices in behind them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Logical identifier of a physical input, e.g. `"CH PRO PEDALS USB/1"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputId(String);

impl InputId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the `<device>/<code>` form the input collector emits
    pub fn for_device(device: &str, code: u32) -> Self {
        Self(format!("{}/{}", device.trim(), code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InputId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axes of the virtual joystick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputAxis {
    X,
    Y,
    Z,
    RX,
    RY,
    RZ,
    Slider,
    Dial,
}

/// 1-based button number on the virtual joystick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputButton(pub u8);

impl fmt::Display for OutputButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "button {}", self.0)
    }
}

/// Read-only view of the physical devices
pub trait InputSource: Send + Sync {
    /// Current axis position in [-1, 1]
    fn axis(&self, id: &InputId) -> f64;

    fn button(&self, id: &InputId) -> bool;
}

/// Write-only view of the virtual joystick; writes take effect immediately
pub trait OutputSink: Send + Sync {
    fn set_axis(&self, axis: OutputAxis, value: f64);

    fn set_button(&self, button: OutputButton, pressed: bool);
}

/// Last known physical input values, updated from host events
///
/// Inputs that never reported read as centred / released.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    axes: HashMap<InputId, f64>,
    buttons: HashMap<InputId, bool>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_axis(&mut self, id: InputId, value: f64) {
        self.axes.insert(id, value);
    }

    pub fn set_button(&mut self, id: InputId, pressed: bool) {
        self.buttons.insert(id, pressed);
    }

    /// True once `id` has reported a position
    pub fn knows_button(&self, id: &InputId) -> bool {
        self.buttons.contains_key(id)
    }
}

impl InputSource for InputState {
    fn axis(&self, id: &InputId) -> f64 {
        self.axes.get(id).copied().unwrap_or(0.0)
    }

    fn button(&self, id: &InputId) -> bool {
        self.buttons.get(id).copied().unwrap_or(false)
    }
}

/// A single write observed by [`RecordingSink`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputWrite {
    Axis(OutputAxis, f64),
    Button(OutputButton, bool),
}

/// Writes kept by [`RecordingSink`]; older ones are dropped
pub const WRITE_LOG_CAPACITY: usize = 256;

#[derive(Default)]
struct Recorded {
    axes: HashMap<OutputAxis, f64>,
    buttons: HashMap<OutputButton, bool>,
    presses: HashMap<OutputButton, usize>,
    writes: VecDeque<OutputWrite>,
}

impl Recorded {
    fn log(&mut self, write: OutputWrite) {
        if self.writes.len() == WRITE_LOG_CAPACITY {
            self.writes.pop_front();
        }
        self.writes.push_back(write);
    }
}

/// In-memory virtual joystick that keeps the current frame, press counts and
/// the most recent writes
///
/// Stands in for the driver-backed device when none is attached.
#[derive(Default)]
pub struct RecordingSink {
    recorded: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(&self, axis: OutputAxis) -> Option<f64> {
        self.recorded.lock().axes.get(&axis).copied()
    }

    pub fn button(&self, button: OutputButton) -> bool {
        self.recorded
            .lock()
            .buttons
            .get(&button)
            .copied()
            .unwrap_or(false)
    }

    /// Last [`WRITE_LOG_CAPACITY`] writes, oldest first
    pub fn writes(&self) -> Vec<OutputWrite> {
        self.recorded.lock().writes.iter().copied().collect()
    }

    /// Number of times `button` was driven to pressed
    pub fn presses(&self, button: OutputButton) -> usize {
        self.recorded
            .lock()
            .presses
            .get(&button)
            .copied()
            .unwrap_or(0)
    }
}

impl OutputSink for RecordingSink {
    fn set_axis(&self, axis: OutputAxis, value: f64) {
        let mut recorded = self.recorded.lock();
        if recorded.axes.get(&axis) != Some(&value) {
            debug!("Virtual axis {:?} -> {:.4}", axis, value);
        }
        recorded.axes.insert(axis, value);
        recorded.log(OutputWrite::Axis(axis, value));
    }

    fn set_button(&self, button: OutputButton, pressed: bool) {
        debug!("Virtual {} -> {}", button, if pressed { "pressed" } else { "released" });
        let mut recorded = self.recorded.lock();
        recorded.buttons.insert(button, pressed);
        if pressed {
            *recorded.presses.entry(button).or_insert(0) += 1;
        }
        recorded.log(OutputWrite::Button(button, pressed));
    }
}
