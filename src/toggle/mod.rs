//! Cooldown-gated reconciliation of on/off ship features
//!
//! A physical switch says what the pilot wants (gear down, lights on, ...);
//! the status file says what the game has. When they disagree the controller
//! presses the game's toggle button, but only after a cooldown: the status
//! file lags the game, and retrying every tick would re-press before the
//! first press has shown up.
//!
//! # State Machine
//!
//! ```text
//!            not synced                 deadline reached
//! Synced ──────────────► CoolingDown ─────────────────► Synced (pulse)
//!   ▲                        │
//!   └────────────────────────┘
//!       synced / manual toggle
//! ```

pub mod pulse;

pub use pulse::{Pulser, PULSE_DURATION};

use crate::clock::Timestamp;
use crate::device::{InputSource, OutputButton};
use crate::status::StatusSnapshot;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// What a sync predicate gets to look at
pub struct SyncContext<'a> {
    pub status: &'a StatusSnapshot,
    pub inputs: &'a dyn InputSource,
}

/// "Does the game already match what the pilot asked for?"
pub type SyncPredicate = Box<dyn Fn(&SyncContext<'_>) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToggleState {
    Synced,
    CoolingDown(Timestamp),
}

/// Outcome of one controller step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncAction {
    /// Nothing to do
    Idle,
    /// Mismatch seen, cooldown started
    Armed(Timestamp),
    /// Still cooling down
    Waiting(Timestamp),
    /// The game caught up on its own; cooldown dropped
    Cleared,
    /// Output pressed
    Pulsed,
}

pub struct ToggleController {
    name: String,
    output: OutputButton,
    cooldown: Duration,
    is_synced: SyncPredicate,
    state: ToggleState,
}

impl ToggleController {
    pub fn new(
        name: impl Into<String>,
        output: OutputButton,
        cooldown: Duration,
        is_synced: impl Fn(&SyncContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            output,
            cooldown,
            is_synced: Box::new(is_synced),
            state: ToggleState::Synced,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> OutputButton {
        self.output
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    pub fn cooldown_deadline(&self) -> Option<Timestamp> {
        match self.state {
            ToggleState::Synced => None,
            ToggleState::CoolingDown(deadline) => Some(deadline),
        }
    }

    pub fn is_synced(&self, ctx: &SyncContext<'_>) -> bool {
        (self.is_synced)(ctx)
    }

    /// Timer-driven step
    pub fn periodic_sync(
        &mut self,
        ctx: &SyncContext<'_>,
        now: Timestamp,
        pulser: &Pulser,
    ) -> SyncAction {
        if self.is_synced(ctx) {
            let previous = std::mem::replace(&mut self.state, ToggleState::Synced);
            return match previous {
                ToggleState::Synced => SyncAction::Idle,
                ToggleState::CoolingDown(deadline) => {
                    debug!("{}: game caught up before {}, cooldown dropped", self.name, deadline);
                    SyncAction::Cleared
                }
            };
        }

        match self.state {
            ToggleState::Synced => {
                let deadline = now + self.cooldown;
                debug!("{}: out of sync at {}, retry at {}", self.name, now, deadline);
                self.state = ToggleState::CoolingDown(deadline);
                SyncAction::Armed(deadline)
            }
            ToggleState::CoolingDown(deadline) if now >= deadline => {
                info!("{}: still out of sync after cooldown, toggling", self.name);
                pulser.pulse(self.output);
                // Optimistic; the next tick re-arms if the game didn't follow.
                self.state = ToggleState::Synced;
                SyncAction::Pulsed
            }
            ToggleState::CoolingDown(deadline) => SyncAction::Waiting(deadline),
        }
    }

    /// Pilot moved the switch: act now, whatever cooldown was running
    pub fn manual_toggle(&mut self, ctx: &SyncContext<'_>, pulser: &Pulser) -> SyncAction {
        let previous = std::mem::replace(&mut self.state, ToggleState::Synced);

        if self.is_synced(ctx) {
            return match previous {
                ToggleState::Synced => SyncAction::Idle,
                ToggleState::CoolingDown(_) => SyncAction::Cleared,
            };
        }

        info!("{}: switch moved, toggling", self.name);
        pulser.pulse(self.output);
        SyncAction::Pulsed
    }
}

impl fmt::Debug for ToggleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToggleController")
            .field("name", &self.name)
            .field("output", &self.output)
            .field("cooldown", &self.cooldown)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
