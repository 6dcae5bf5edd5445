//! Momentary button presses on the virtual joystick
//!
//! The game reads toggles as button presses, so changing a feature means
//! pressing the mapped virtual button briefly. [`Pulser`] presses now and
//! schedules the release on the clock.

use crate::clock::Clock;
use crate::device::{OutputButton, OutputSink};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How long a pulse holds the button down
pub const PULSE_DURATION: Duration = Duration::from_millis(200);

/// Presses virtual buttons and releases them after a fixed delay
///
/// Each press bumps a per-button generation; a scheduled release only fires
/// if no newer press happened in between, so a re-pulse re-arms the delay.
#[derive(Clone)]
pub struct Pulser {
    sink: Arc<dyn OutputSink>,
    clock: Arc<dyn Clock>,
    duration: Duration,
    generations: Arc<Mutex<HashMap<OutputButton, u64>>>,
}

impl Pulser {
    pub fn new(sink: Arc<dyn OutputSink>, clock: Arc<dyn Clock>, duration: Duration) -> Self {
        Self {
            sink,
            clock,
            duration,
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pulse(&self, button: OutputButton) {
        let generation = {
            let mut generations = self.generations.lock();
            let generation = generations.entry(button).or_insert(0);
            *generation += 1;
            self.sink.set_button(button, true);
            *generation
        };
        info!(
            "Pulsing {} for {}ms",
            button,
            self.duration.as_millis()
        );

        let sink = self.sink.clone();
        let generations = self.generations.clone();
        self.clock.schedule_after(
            self.duration,
            Box::new(move || {
                let generations = generations.lock();
                if generations.get(&button) == Some(&generation) {
                    sink.set_button(button, false);
                } else {
                    debug!("Release of {} superseded by a newer pulse", button);
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Timestamp};
    use crate::device::{OutputWrite, RecordingSink};

    fn setup() -> (Pulser, Arc<RecordingSink>, Arc<ManualClock>) {
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::starting_at(Timestamp::from_secs_f64(0.0)));
        let pulser = Pulser::new(sink.clone(), clock.clone(), PULSE_DURATION);
        (pulser, sink, clock)
    }

    #[test]
    fn test_pulse_presses_then_releases() {
        let (pulser, sink, clock) = setup();
        let lights = OutputButton(7);

        pulser.pulse(lights);
        assert!(sink.button(lights));

        clock.advance(Duration::from_millis(190));
        assert!(sink.button(lights));

        clock.advance(Duration::from_millis(20));
        assert!(!sink.button(lights));
        assert_eq!(
            sink.writes(),
            vec![
                OutputWrite::Button(lights, true),
                OutputWrite::Button(lights, false)
            ]
        );
    }

    #[test]
    fn test_repulse_rearms_release() {
        let (pulser, sink, clock) = setup();
        let gear = OutputButton(3);

        pulser.pulse(gear);
        clock.advance(Duration::from_millis(150));
        pulser.pulse(gear);

        // First release is due now but superseded
        clock.advance(Duration::from_millis(100));
        assert!(sink.button(gear));

        clock.advance(Duration::from_millis(150));
        assert!(!sink.button(gear));
        assert_eq!(sink.presses(gear), 2);
    }

    #[test]
    fn test_pulses_on_different_buttons_are_independent() {
        let (pulser, sink, clock) = setup();
        pulser.pulse(OutputButton(1));
        clock.advance(Duration::from_millis(100));
        pulser.pulse(OutputButton(2));

        clock.advance(Duration::from_millis(150));
        assert!(!sink.button(OutputButton(1)));
        assert!(sink.button(OutputButton(2)));

        clock.advance(Duration::from_millis(100));
        assert!(!sink.button(OutputButton(2)));
    }
}
