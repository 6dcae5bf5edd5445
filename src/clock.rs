//! Time source and delayed-callback scheduling
//!
//! Everything in the sync core that depends on time goes through [`Clock`]:
//! cooldown deadlines read [`Clock::now`], and button pulses release through
//! [`Clock::schedule_after`]. Production code runs on [`TokioClock`]; tests
//! drive [`ManualClock`] forward by hand instead of sleeping.

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::debug;

/// Callback run by a clock once its delay has elapsed
pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// Point in time as seconds since an arbitrary, clock-specific origin
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    pub const fn as_secs_f64(self) -> f64 {
        self.0
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs.as_secs_f64())
    }
}

impl Sub for Timestamp {
    type Output = f64;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.0 - rhs.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Injectable time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Runs `task` once `delay` has elapsed, without blocking the caller
    fn schedule_after(&self, delay: Duration, task: ScheduledTask);
}

/// Clock backed by the tokio runtime it was created on
pub struct TokioClock {
    origin: Instant,
    runtime: Handle,
}

impl TokioClock {
    /// Must be called from within a tokio runtime
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            runtime: Handle::current(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs_f64(self.origin.elapsed().as_secs_f64())
    }

    fn schedule_after(&self, delay: Duration, task: ScheduledTask) {
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

struct PendingTask {
    due: Timestamp,
    seq: u64,
    task: ScheduledTask,
}

#[derive(Default)]
struct ManualState {
    now: Timestamp,
    next_seq: u64,
    pending: Vec<PendingTask>,
}

/// Hand-driven clock: time only moves on [`ManualClock::advance`]
#[derive(Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                ..Default::default()
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        self.advance_to(target);
    }

    /// Moves time forward to `target` and runs every task that fell due,
    /// earliest first. Going backwards is ignored.
    pub fn advance_to(&self, target: Timestamp) {
        {
            let mut state = self.state.lock();
            if target > state.now {
                state.now = target;
            }
        }

        // Tasks run outside the lock so they may schedule follow-ups.
        while let Some(pending) = self.pop_due() {
            debug!("Running task scheduled for {}", pending.due);
            (pending.task)();
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn pop_due(&self) -> Option<PendingTask> {
        let mut state = self.state.lock();
        let now = state.now;
        let index = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by(|(_, a), (_, b)| {
                a.due
                    .partial_cmp(&b.due)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(i, _)| i)?;
        Some(state.pending.swap_remove(index))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.state.lock().now
    }

    fn schedule_after(&self, delay: Duration, task: ScheduledTask) {
        let mut state = self.state.lock();
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(PendingTask { due, seq, task });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_timestamp_arithmetic() {
        let start = Timestamp::from_secs_f64(1000.0);
        let deadline = start + Duration::from_secs(4);
        assert_eq!(deadline.as_secs_f64(), 1004.0);
        assert_eq!(deadline - start, 4.0);
        assert!(Timestamp::from_secs_f64(1003.9) < deadline);
    }

    #[test]
    fn test_manual_clock_runs_due_tasks_in_order() {
        let clock = ManualClock::starting_at(Timestamp::from_secs_f64(10.0));
        let order = Arc::new(Mutex::new(Vec::new()));

        for (delay, tag) in [(300, "late"), (100, "early"), (200, "middle")] {
            let order = order.clone();
            clock.schedule_after(
                Duration::from_millis(delay),
                Box::new(move || order.lock().push(tag)),
            );
        }

        clock.advance(Duration::from_millis(150));
        assert_eq!(*order.lock(), vec!["early"]);
        assert_eq!(clock.pending_tasks(), 2);

        clock.advance(Duration::from_millis(200));
        assert_eq!(*order.lock(), vec!["early", "middle", "late"]);
        assert_eq!(clock.pending_tasks(), 0);
    }

    #[test]
    fn test_manual_clock_ignores_backwards_moves() {
        let clock = ManualClock::starting_at(Timestamp::from_secs_f64(5.0));
        clock.advance_to(Timestamp::from_secs_f64(2.0));
        assert_eq!(clock.now(), Timestamp::from_secs_f64(5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_schedules_after_delay() {
        let clock = TokioClock::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        clock.schedule_after(
            Duration::from_millis(200),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(clock.now().as_secs_f64() >= 0.25);
    }
}
