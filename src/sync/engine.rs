//! The sync engine: one owner for the status snapshot, the feature table and
//! the analog rules
//!
//! # Architecture
//!
//! ```text
//! tick ──► StatusFeed ──► decode ──► StatusSnapshot
//!                                         │
//!                     ┌───────────────────┴──────────────┐
//!                     ▼                                  ▼
//!          ToggleController::periodic_sync       AnalogRule::evaluate
//!                     │                                  │
//!                  Pulser ──────────► OutputSink ◄───────┘
//!
//! HostEvent ──► InputState ──► registered handlers (same paths, no timer)
//! ```

use super::AnalogRule;
use crate::clock::{Clock, Timestamp};
use crate::controller::HostEvent;
use crate::device::{InputId, InputState, OutputSink};
use crate::status::{decode, FeedError, StatusFeed, StatusSnapshot};
use crate::toggle::{Pulser, SyncAction, SyncContext, ToggleController};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to run when a registered input changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Index into the feature table
    Toggle(usize),
    /// Index into the analog rules
    Analog(usize),
}

/// The engine's status feed, shareable with a blocking reader thread
pub type SharedStatusFeed = Arc<Mutex<Box<dyn StatusFeed>>>;

pub struct SyncEngine {
    feed: SharedStatusFeed,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn OutputSink>,
    pulser: Pulser,
    inputs: InputState,
    snapshot: StatusSnapshot,
    features: Vec<ToggleController>,
    // Switch of each feature, parallel to `features`
    switches: Vec<Option<InputId>>,
    analog: Vec<AnalogRule>,
    handlers: Vec<(InputId, Handler)>,
    failed_reads: u32,
}

impl SyncEngine {
    pub fn new(
        feed: Box<dyn StatusFeed>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn OutputSink>,
        pulse_duration: Duration,
    ) -> Self {
        let pulser = Pulser::new(sink.clone(), clock.clone(), pulse_duration);
        Self {
            feed: Arc::new(Mutex::new(feed)),
            clock,
            sink,
            pulser,
            inputs: InputState::new(),
            snapshot: StatusSnapshot::default(),
            features: Vec::new(),
            switches: Vec::new(),
            analog: Vec::new(),
            handlers: Vec::new(),
            failed_reads: 0,
        }
    }

    /// Adds a feature; ticks visit features in registration order
    ///
    /// A feature with a switch is left alone by ticks until that switch has
    /// reported a position.
    pub fn register_toggle(&mut self, controller: ToggleController, switch: Option<InputId>) {
        let index = self.features.len();
        debug!(
            "Registering feature {} on {} (switch: {:?})",
            controller.name(),
            controller.output(),
            switch
        );
        if let Some(switch) = &switch {
            self.handlers.push((switch.clone(), Handler::Toggle(index)));
        }
        self.features.push(controller);
        self.switches.push(switch);
    }

    pub fn register_analog(&mut self, rule: AnalogRule) {
        let index = self.analog.len();
        debug!("Registering analog rule {} -> {:?}", rule.name(), rule.output());
        for input in rule.inputs() {
            self.handlers.push((input.clone(), Handler::Analog(index)));
        }
        self.analog.push(rule);
    }

    /// One poll cycle. Never fails: a bad read keeps the previous snapshot.
    pub fn tick(&mut self) {
        let read = self.feed.lock().read();
        self.tick_with_read(read);
    }

    /// The poll cycle for a read already taken from [`SyncEngine::feed`]
    pub fn tick_with_read(&mut self, read: Result<Vec<u8>, FeedError>) {
        self.refresh(read);

        let now = self.clock.now();
        let ctx = SyncContext {
            status: &self.snapshot,
            inputs: &self.inputs,
        };
        for (controller, switch) in self.features.iter_mut().zip(&self.switches) {
            if let Some(switch) = switch {
                if !self.inputs.knows_button(switch) {
                    debug!("{}: waiting for {} to report", controller.name(), switch);
                    continue;
                }
            }
            let action = controller.periodic_sync(&ctx, now, &self.pulser);
            log_action(controller.name(), action);
        }

        for index in 0..self.analog.len() {
            self.write_analog(index);
        }
    }

    fn refresh(&mut self, read: Result<Vec<u8>, FeedError>) {
        match read.and_then(|raw| decode(&raw)) {
            Ok(snapshot) => {
                if self.failed_reads > 0 {
                    info!("Status feed back after {} failed reads", self.failed_reads);
                    self.failed_reads = 0;
                }
                if snapshot.flags() != self.snapshot.flags()
                    || snapshot.focus() != self.snapshot.focus()
                {
                    debug!(
                        "Status changed: flags {:#010x} focus {:?}",
                        snapshot.flags().bits(),
                        snapshot.focus()
                    );
                }
                self.snapshot = snapshot;
            }
            Err(e) => {
                self.failed_reads += 1;
                match e {
                    FeedError::Unavailable(_) if self.failed_reads > 1 => {
                        debug!("Status feed still unavailable ({}x): {}", self.failed_reads, e)
                    }
                    _ => warn!("Keeping previous status snapshot: {}", e),
                }
            }
        }
    }

    /// Switch or button moved on a physical device
    pub fn handle_button(&mut self, input: InputId, pressed: bool) {
        self.inputs.set_button(input.clone(), pressed);

        for handler in self.handlers_for(&input) {
            match handler {
                Handler::Toggle(index) => self.manual_toggle(index),
                Handler::Analog(index) => self.write_analog(index),
            }
        }
    }

    /// Axis moved on a physical device
    pub fn handle_axis(&mut self, input: InputId, value: f64) {
        self.inputs.set_axis(input.clone(), value);

        for handler in self.handlers_for(&input) {
            if let Handler::Analog(index) = handler {
                self.write_analog(index);
            }
        }
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Axis { input, value } => self.handle_axis(input, value),
            HostEvent::Button { input, pressed } => self.handle_button(input, pressed),
        }
    }

    fn handlers_for(&self, input: &InputId) -> Vec<Handler> {
        self.handlers
            .iter()
            .filter(|(id, _)| id == input)
            .map(|(_, handler)| *handler)
            .collect()
    }

    fn manual_toggle(&mut self, index: usize) {
        let ctx = SyncContext {
            status: &self.snapshot,
            inputs: &self.inputs,
        };
        if let Some(controller) = self.features.get_mut(index) {
            let action = controller.manual_toggle(&ctx, &self.pulser);
            log_action(controller.name(), action);
        }
    }

    fn write_analog(&self, index: usize) {
        let Some(rule) = self.analog.get(index) else {
            return;
        };
        if let Some(value) = rule.evaluate(&self.snapshot, &self.inputs) {
            self.sink.set_axis(rule.output(), value);
        }
    }

    /// Handle for reading the status feed off the engine's task
    pub fn feed(&self) -> SharedStatusFeed {
        self.feed.clone()
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Pending cooldown deadline of the named feature
    pub fn deadline(&self, feature: &str) -> Option<Timestamp> {
        self.features
            .iter()
            .find(|c| c.name() == feature)
            .and_then(ToggleController::cooldown_deadline)
    }

    pub fn features(&self) -> &[ToggleController] {
        &self.features
    }

    pub fn analog_rules(&self) -> &[AnalogRule] {
        &self.analog
    }

    pub fn handlers(&self) -> &[(InputId, Handler)] {
        &self.handlers
    }

    pub fn inputs(&self) -> &InputState {
        &self.inputs
    }

    /// Direct access for seeding device state; runs no handlers
    pub fn inputs_mut(&mut self) -> &mut InputState {
        &mut self.inputs
    }

    /// Consecutive feed failures since the last good read
    pub fn failed_reads(&self) -> u32 {
        self.failed_reads
    }
}

fn log_action(name: &str, action: SyncAction) {
    match action {
        SyncAction::Idle | SyncAction::Waiting(_) => {}
        SyncAction::Armed(deadline) => debug!("{}: cooldown until {}", name, deadline),
        SyncAction::Cleared => debug!("{}: in sync", name),
        SyncAction::Pulsed => info!("{}: toggled", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::{InputSource, OutputAxis, OutputButton, RecordingSink};
    use crate::shaping::STEERING_CURVE;
    use crate::status::StatusFlags;
    use crate::sync::{AnalogSource, ModeGate};
    use crate::toggle::PULSE_DURATION;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Feed that replays queued documents, then reports the file missing
    #[derive(Clone, Default)]
    struct ScriptedFeed {
        queue: Arc<Mutex<VecDeque<Result<String, ()>>>>,
    }

    impl ScriptedFeed {
        fn push_flags(&self, flags: StatusFlags) {
            self.queue.lock().push_back(Ok(format!(
                r#"{{ "timestamp":"2025-03-14T18:00:00Z", "event":"Status", "Flags":{} }}"#,
                flags.bits()
            )));
        }

        fn push_garbage(&self) {
            self.queue.lock().push_back(Ok("{ \"Flags\": ".to_string()));
        }

        fn push_missing(&self) {
            self.queue.lock().push_back(Err(()));
        }
    }

    impl StatusFeed for ScriptedFeed {
        fn read(&mut self) -> Result<Vec<u8>, FeedError> {
            match self.queue.lock().pop_front() {
                Some(Ok(doc)) => Ok(doc.into_bytes()),
                Some(Err(())) | None => Err(FeedError::Unavailable("scripted".to_string())),
            }
        }
    }

    const GEAR_SWITCH: &str = "throttle/12";
    const GEAR_OUT: OutputButton = OutputButton(3);

    fn engine() -> (SyncEngine, ScriptedFeed, Arc<ManualClock>, Arc<RecordingSink>) {
        let feed = ScriptedFeed::default();
        let clock = Arc::new(ManualClock::starting_at(Timestamp::from_secs_f64(0.0)));
        let sink = Arc::new(RecordingSink::new());
        let mut engine = SyncEngine::new(
            Box::new(feed.clone()),
            clock.clone(),
            sink.clone(),
            PULSE_DURATION,
        );

        let switch = InputId::from(GEAR_SWITCH);
        let watched = switch.clone();
        engine.register_toggle(
            ToggleController::new("landing_gear", GEAR_OUT, Duration::from_millis(1100), move |ctx| {
                ctx.status.has(StatusFlags::LANDING_GEAR_DOWN) == ctx.inputs.button(&watched)
            }),
            Some(switch),
        );
        (engine, feed, clock, sink)
    }

    #[test]
    fn test_tick_replaces_snapshot_on_success() {
        let (mut engine, feed, _clock, _sink) = engine();
        feed.push_flags(StatusFlags::LIGHTS_ON | StatusFlags::IN_MAIN_SHIP);
        engine.tick();
        assert!(engine.snapshot().has(StatusFlags::LIGHTS_ON));
        assert_eq!(engine.failed_reads(), 0);
    }

    #[test]
    fn test_failed_reads_keep_snapshot_and_deadlines() {
        let (mut engine, feed, clock, sink) = engine();
        engine.inputs_mut().set_button(InputId::from(GEAR_SWITCH), true);

        feed.push_flags(StatusFlags::IN_MAIN_SHIP);
        engine.tick();
        let snapshot = *engine.snapshot();
        let deadline = engine.deadline("landing_gear");
        assert!(deadline.is_some());

        feed.push_garbage();
        clock.advance(Duration::from_millis(300));
        engine.tick();
        feed.push_missing();
        clock.advance(Duration::from_millis(300));
        engine.tick();

        assert_eq!(*engine.snapshot(), snapshot);
        assert_eq!(engine.deadline("landing_gear"), deadline);
        assert_eq!(engine.failed_reads(), 2);
        assert_eq!(sink.presses(GEAR_OUT), 0);
    }

    #[test]
    fn test_switch_event_toggles_immediately() {
        let (mut engine, feed, _clock, sink) = engine();
        feed.push_flags(StatusFlags::IN_MAIN_SHIP);
        engine.tick();

        engine.handle_event(HostEvent::Button {
            input: InputId::from(GEAR_SWITCH),
            pressed: true,
        });
        assert_eq!(sink.presses(GEAR_OUT), 1);
        assert_eq!(engine.deadline("landing_gear"), None);
    }

    #[test]
    fn test_unreported_switch_is_not_synced() {
        let (mut engine, feed, clock, sink) = engine();

        // Gear is down but the switch has never reported
        for _ in 0..4 {
            feed.push_flags(StatusFlags::LANDING_GEAR_DOWN | StatusFlags::IN_MAIN_SHIP);
            engine.tick();
            clock.advance(Duration::from_millis(500));
        }
        assert_eq!(engine.deadline("landing_gear"), None);
        assert_eq!(sink.presses(GEAR_OUT), 0);

        // Once it reports released, the mismatch is handled as usual
        engine.inputs_mut().set_button(InputId::from(GEAR_SWITCH), false);
        feed.push_flags(StatusFlags::LANDING_GEAR_DOWN | StatusFlags::IN_MAIN_SHIP);
        engine.tick();
        assert!(engine.deadline("landing_gear").is_some());
    }

    #[test]
    fn test_tick_with_read_from_shared_feed() {
        let (mut engine, feed, _clock, _sink) = engine();
        feed.push_flags(StatusFlags::IN_SRV);

        let shared = engine.feed();
        let read = std::thread::spawn(move || shared.lock().read())
            .join()
            .unwrap();
        engine.tick_with_read(read);
        assert!(engine.snapshot().has(StatusFlags::IN_SRV));

        engine.tick_with_read(Err(FeedError::Unavailable("locked".to_string())));
        assert!(engine.snapshot().has(StatusFlags::IN_SRV));
        assert_eq!(engine.failed_reads(), 1);
    }

    #[test]
    fn test_unbound_button_changes_nothing() {
        let (mut engine, _feed, _clock, sink) = engine();
        engine.handle_button(InputId::from("throttle/99"), true);
        assert!(sink.writes().is_empty());
        assert!(engine.inputs().button(&InputId::from("throttle/99")));
    }

    #[test]
    fn test_axis_event_rewrites_bound_outputs() {
        let (mut engine, feed, _clock, sink) = engine();
        engine.register_analog(
            AnalogRule::new(
                "pedals",
                OutputAxis::RX,
                AnalogSource::DualPedal {
                    back: InputId::from("pedals/1"),
                    forward: InputId::from("pedals/2"),
                },
            )
            .unwrap(),
        );
        engine.register_analog(
            AnalogRule::new(
                "srv_steering",
                OutputAxis::X,
                AnalogSource::Curve {
                    input: InputId::from("stick/0"),
                    curve: STEERING_CURVE.to_vec(),
                },
            )
            .unwrap()
            .gated(ModeGate {
                flag: StatusFlags::IN_SRV,
                active: true,
            }),
        );

        engine.handle_axis(InputId::from("pedals/1"), -1.0);
        engine.handle_axis(InputId::from("pedals/2"), 1.0);
        assert_eq!(sink.axis(OutputAxis::RX), Some(1.0));

        engine.handle_axis(InputId::from("stick/0"), -0.5);
        assert_eq!(sink.axis(OutputAxis::X), None);

        feed.push_flags(StatusFlags::IN_SRV);
        engine.tick();
        assert_eq!(sink.axis(OutputAxis::X), Some(-0.25));
    }

    #[test]
    fn test_handler_table_follows_registration() {
        let (mut engine, _feed, _clock, _sink) = engine();
        engine.register_analog(
            AnalogRule::new(
                "throttle",
                OutputAxis::Z,
                AnalogSource::Throttle {
                    forward: InputId::from("throttle/0"),
                    backward: InputId::from("throttle/1"),
                },
            )
            .unwrap(),
        );

        let handlers: Vec<Handler> = engine.handlers().iter().map(|(_, h)| *h).collect();
        assert_eq!(
            handlers,
            vec![Handler::Toggle(0), Handler::Analog(0), Handler::Analog(0)]
        );
        assert_eq!(engine.features().len(), 1);
        assert_eq!(engine.analog_rules().len(), 1);
    }
}
