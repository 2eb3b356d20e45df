//! Per-connection consecutive-failure liveness tracking.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Counts consecutive failed liveness probes for one connection and decides
/// when the connection has exceeded its failure budget.
///
/// This is a simplified, deadline-based cousin of a phi-accrual detector: it
/// tracks consecutive misses rather than a statistical suspicion score,
/// matching a hard `maxConsecutiveFailures` threshold rather than a tunable
/// confidence level.
pub struct HeartbeatSupervisor {
    interval: Duration,
    max_consecutive_failures: u32,
    consecutive_failures: AtomicU32,
}

impl HeartbeatSupervisor {
    #[must_use]
    pub fn new(interval: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            interval,
            max_consecutive_failures,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    /// Records a failed probe. Returns `true` if the connection has now
    /// exceeded its consecutive-failure budget and should be evicted.
    pub fn record_failure(&self) -> bool {
        let count = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        count >= self.max_consecutive_failures
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_the_counter() {
        let supervisor = HeartbeatSupervisor::new(Duration::from_secs(1), 3);
        supervisor.record_failure();
        supervisor.record_failure();
        supervisor.record_success();
        assert_eq!(supervisor.consecutive_failures(), 0);
    }

    #[test]
    fn eviction_triggers_at_the_threshold_not_before() {
        let supervisor = HeartbeatSupervisor::new(Duration::from_secs(1), 3);
        assert!(!supervisor.record_failure());
        assert!(!supervisor.record_failure());
        assert!(supervisor.record_failure());
    }
}
