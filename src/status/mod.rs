//! Game-reported ship state
//!
//! The game rewrites `Status.json` in its journal directory whenever the
//! ship state changes. [`StatusSnapshot`] is one decoded copy of that file;
//! the engine swaps whole snapshots and never edits one in place.

pub mod feed;

pub use feed::{decode, FeedError, FileStatusFeed, StatusFeed};

use bitflags::bitflags;
use chrono::{DateTime, Utc};

bitflags! {
    /// `Flags` field of the status file, bit for bit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u32 {
        const DOCKED = 1 << 0;
        const LANDED = 1 << 1;
        const LANDING_GEAR_DOWN = 1 << 2;
        const SHIELDS_UP = 1 << 3;
        const SUPERCRUISE = 1 << 4;
        const FLIGHT_ASSIST_OFF = 1 << 5;
        const HARDPOINTS_DEPLOYED = 1 << 6;
        const IN_WING = 1 << 7;
        const LIGHTS_ON = 1 << 8;
        const CARGO_SCOOP_DEPLOYED = 1 << 9;
        const SILENT_RUNNING = 1 << 10;
        const SCOOPING_FUEL = 1 << 11;
        const SRV_HANDBRAKE = 1 << 12;
        const SRV_TURRET_VIEW = 1 << 13;
        const SRV_TURRET_RETRACTED = 1 << 14;
        const SRV_DRIVE_ASSIST = 1 << 15;
        const FSD_MASS_LOCKED = 1 << 16;
        const FSD_CHARGING = 1 << 17;
        const FSD_COOLDOWN = 1 << 18;
        const LOW_FUEL = 1 << 19;
        const OVERHEATING = 1 << 20;
        const HAS_LAT_LONG = 1 << 21;
        const IN_DANGER = 1 << 22;
        const BEING_INTERDICTED = 1 << 23;
        const IN_MAIN_SHIP = 1 << 24;
        const IN_FIGHTER = 1 << 25;
        const IN_SRV = 1 << 26;
        const HUD_ANALYSIS_MODE = 1 << 27;
        const NIGHT_VISION = 1 << 28;
        const ALTITUDE_FROM_AVERAGE_RADIUS = 1 << 29;
        const FSD_JUMP = 1 << 30;
        const SRV_HIGH_BEAM = 1 << 31;
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl StatusFlags {
    /// Looks a single flag up by name, case-insensitively
    /// (`"landing_gear_down"`, `"IN_SRV"`, ...)
    pub fn parse_name(name: &str) -> Option<Self> {
        Self::from_name(&name.trim().to_ascii_uppercase())
    }
}

/// Panel or screen holding input focus (`GuiFocus` in the status file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GuiFocus {
    #[default]
    NoFocus,
    InternalPanel,
    ExternalPanel,
    CommsPanel,
    RolePanel,
    StationServices,
    GalaxyMap,
    SystemMap,
    Orrery,
    Fss,
    Saa,
    Codex,
}

impl GuiFocus {
    /// Values the game has not documented fall back to [`GuiFocus::NoFocus`]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => GuiFocus::InternalPanel,
            2 => GuiFocus::ExternalPanel,
            3 => GuiFocus::CommsPanel,
            4 => GuiFocus::RolePanel,
            5 => GuiFocus::StationServices,
            6 => GuiFocus::GalaxyMap,
            7 => GuiFocus::SystemMap,
            8 => GuiFocus::Orrery,
            9 => GuiFocus::Fss,
            10 => GuiFocus::Saa,
            11 => GuiFocus::Codex,
            _ => GuiFocus::NoFocus,
        }
    }
}

/// Immutable point-in-time view of the status file
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusSnapshot {
    flags: StatusFlags,
    focus: GuiFocus,
    timestamp: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    pub fn new(flags: StatusFlags, focus: GuiFocus) -> Self {
        Self {
            flags,
            focus,
            timestamp: None,
        }
    }

    pub fn with_timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }

    pub fn flags(&self) -> StatusFlags {
        self.flags
    }

    /// True when every bit of `flag` is set
    pub fn has(&self, flag: StatusFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn focus(&self) -> GuiFocus {
        self.focus
    }

    /// When the game wrote the file, if it said so
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}
