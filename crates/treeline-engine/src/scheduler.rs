//! Tick Scheduler
//!
//! The engine has no thread of its own; the host calls `tick(now)`
//! from its frame or timer loop and the scheduler decides which
//! periodic duties are due. Time is passed in, never read, so tests
//! can drive the clock.

use std::time::{Duration, Instant};

#[derive(Debug)]
struct Cadence {
    interval: Duration,
    last: Option<Instant>,
}

impl Cadence {
    fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Due on the first call and whenever the interval has elapsed
    fn due(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// Duties due on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub dispatch: bool,
    pub cleanup: bool,
    pub stats: bool,
}

impl TickPlan {
    pub fn is_idle(&self) -> bool {
        !(self.dispatch || self.cleanup || self.stats)
    }
}

#[derive(Debug)]
pub struct Scheduler {
    dispatch: Cadence,
    cleanup: Cadence,
    stats: Cadence,
}

impl Scheduler {
    pub fn new(dispatch: Duration, cleanup: Duration, stats: Duration) -> Self {
        Self {
            dispatch: Cadence::new(dispatch),
            cleanup: Cadence::new(cleanup),
            stats: Cadence::new(stats),
        }
    }

    pub fn plan(&mut self, now: Instant) -> TickPlan {
        TickPlan {
            dispatch: self.dispatch.due(now),
            cleanup: self.cleanup.due(now),
            stats: self.stats.due(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_due_on_first_tick() {
        let mut s = Scheduler::new(
            Duration::from_millis(16),
            Duration::from_millis(500),
            Duration::from_secs(2),
        );
        let plan = s.plan(Instant::now());
        assert!(plan.dispatch && plan.cleanup && plan.stats);
    }

    #[test]
    fn test_cadences_fire_independently() {
        let mut s = Scheduler::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            Duration::from_secs(10),
        );
        let start = Instant::now();
        s.plan(start);

        let plan = s.plan(start + Duration::from_millis(10));
        assert_eq!(plan, TickPlan { dispatch: true, cleanup: false, stats: false });

        let plan = s.plan(start + Duration::from_millis(15));
        assert!(plan.is_idle());

        let plan = s.plan(start + Duration::from_millis(115));
        assert!(plan.dispatch && plan.cleanup && !plan.stats);
    }

    #[test]
    fn test_clock_going_backwards_is_not_due() {
        let mut s = Scheduler::new(
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        let start = Instant::now();
        s.plan(start + Duration::from_secs(1));
        let plan = s.plan(start);
        assert!(plan.is_idle());
    }
}
