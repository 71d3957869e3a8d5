//! Drain plan for graceful shutdown.
//!
//! Once shutdown begins the server stops admitting connections and waits for
//! the active count to reach zero, but never past a fixed deadline. The plan
//! is the pure decision half of that loop: given the current time and active
//! count, stop now or wait another polling interval. The server drives it.

use std::{ops::Add, time::Duration};

/// Default grace period for in-flight sessions.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between drain checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every session finished before the deadline
    Graceful,
    /// The deadline passed with sessions still open
    Forced {
        /// Sessions abandoned by the stop
        abandoned: usize,
    },
}

/// Result of one drain check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainDecision {
    /// Stop the server now
    Stop(DrainOutcome),
    /// Check again after the polling interval
    Wait,
}

/// Deadline-bounded drain.
#[derive(Debug, Clone, Copy)]
pub struct DrainPlan<I> {
    deadline: I,
}

impl<I> DrainPlan<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Plan a drain that started at `now` and may last `timeout`.
    pub fn new(now: I, timeout: Duration) -> Self {
        Self { deadline: now + timeout }
    }

    /// Instant at which remaining sessions are abandoned.
    pub fn deadline(&self) -> I {
        self.deadline
    }

    /// Decide whether to stop.
    ///
    /// An empty registry always wins, even at or past the deadline.
    pub fn check(&self, now: I, active: usize) -> DrainDecision {
        if active == 0 {
            DrainDecision::Stop(DrainOutcome::Graceful)
        } else if now >= self.deadline {
            DrainDecision::Stop(DrainOutcome::Forced { abandoned: active })
        } else {
            DrainDecision::Wait
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn empty_registry_stops_immediately() {
        let t0 = Instant::now();
        let plan = DrainPlan::new(t0, Duration::from_secs(120));
        assert_eq!(plan.check(t0, 0), DrainDecision::Stop(DrainOutcome::Graceful));
    }

    #[test]
    fn active_sessions_wait_until_deadline() {
        let t0 = Instant::now();
        let plan = DrainPlan::new(t0, Duration::from_secs(5));

        assert_eq!(plan.check(t0, 2), DrainDecision::Wait);
        assert_eq!(plan.check(t0 + Duration::from_millis(4999), 2), DrainDecision::Wait);
        assert_eq!(
            plan.check(t0 + Duration::from_secs(5), 2),
            DrainDecision::Stop(DrainOutcome::Forced { abandoned: 2 })
        );
    }

    #[test]
    fn graceful_wins_at_deadline() {
        let t0 = Instant::now();
        let plan = DrainPlan::new(t0, Duration::from_secs(5));
        assert_eq!(
            plan.check(t0 + Duration::from_secs(10), 0),
            DrainDecision::Stop(DrainOutcome::Graceful)
        );
    }

    #[test]
    fn zero_timeout_forces_immediately() {
        let t0 = Instant::now();
        let plan = DrainPlan::new(t0, Duration::ZERO);
        assert_eq!(plan.deadline(), t0);
        assert_eq!(plan.check(t0, 1), DrainDecision::Stop(DrainOutcome::Forced { abandoned: 1 }));
    }
}
