//! FailureTracker - per-destination health and backoff
//!
//! Turns a stream of per-destination send results into an eligibility decision
//! for the next attempt. Entries live in a side table indexed by
//! [`EndpointIndex`], one mutex per entry, so contention on one destination's
//! health never blocks another's.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use contracts::DestinationId;

use crate::endpoint::EndpointIndex;

/// Health state of a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Healthy,
    /// Failing, but below the suspend threshold
    Degraded,
    /// Excluded from delivery until its backoff window elapses
    Suspended,
}

impl HealthState {
    /// Numeric encoding for gauges
    pub fn as_gauge(self) -> f64 {
        match self {
            Self::Healthy => 0.0,
            Self::Degraded => 1.0,
            Self::Suspended => 2.0,
        }
    }
}

/// Health entry for one destination
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub endpoint_id: DestinationId,
    pub consecutive_failures: u32,
    #[serde(skip)]
    pub last_failure: Option<Instant>,
    pub state: HealthState,
    /// A retry was admitted and has not reported back yet
    pub retry_in_flight: bool,
}

impl EndpointHealth {
    fn new(endpoint_id: DestinationId) -> Self {
        Self {
            endpoint_id,
            consecutive_failures: 0,
            last_failure: None,
            state: HealthState::Healthy,
            retry_in_flight: false,
        }
    }
}

/// Decision for one destination before a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Healthy or degraded: send normally
    Attempt,
    /// Suspended but its backoff elapsed: send as the single retry
    Retry,
    /// Suspended: do not send
    Skip { retry_in: Duration },
    /// Suspended and another caller's retry is still pending: do not send
    AwaitRetry,
}

/// Thresholds and retry schedule
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Consecutive failures before a destination is suspended
    pub failure_threshold: u32,
    /// Wait after the suspending failure
    pub base: Duration,
    /// Cap for the doubling schedule
    pub max: Duration,
}

impl BackoffPolicy {
    /// Backoff for a suspended destination with `failures` consecutive failures
    ///
    /// `base * 2^(failures - threshold)`, capped at `max`.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(self.failure_threshold).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Per-destination failure tracker
#[derive(Debug)]
pub struct FailureTracker {
    policy: BackoffPolicy,
    entries: Vec<Mutex<EndpointHealth>>,
}

impl FailureTracker {
    /// One healthy entry per destination, in arena order
    pub fn new(policy: BackoffPolicy, ids: impl IntoIterator<Item = DestinationId>) -> Self {
        Self {
            policy,
            entries: ids
                .into_iter()
                .map(|id| Mutex::new(EndpointHealth::new(id)))
                .collect(),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn entry(&self, idx: EndpointIndex) -> MutexGuard<'_, EndpointHealth> {
        self.entries[idx.get()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether to send to `idx` now
    ///
    /// A suspended entry admits exactly one retry per backoff window. The
    /// retry moves it to `Degraded`; every other caller gets `AwaitRetry`
    /// until that retry is recorded.
    pub fn eligibility(&self, idx: EndpointIndex, now: Instant) -> Eligibility {
        let mut health = self.entry(idx);
        if health.retry_in_flight {
            return Eligibility::AwaitRetry;
        }
        if health.state != HealthState::Suspended {
            return Eligibility::Attempt;
        }

        let delay = self.policy.delay(health.consecutive_failures);
        let ready_at = health.last_failure.map_or(now, |t| t + delay);
        if now >= ready_at {
            health.retry_in_flight = true;
            health.state = HealthState::Degraded;
            Eligibility::Retry
        } else {
            Eligibility::Skip {
                retry_in: ready_at - now,
            }
        }
    }

    /// Record an acknowledged send
    pub fn record_success(&self, idx: EndpointIndex) -> HealthState {
        let mut health = self.entry(idx);
        health.consecutive_failures = 0;
        health.retry_in_flight = false;
        health.state = HealthState::Healthy;
        health.state
    }

    /// Record a failed send (timeouts included)
    ///
    /// `retry` marks the result of an attempt admitted as `Eligibility::Retry`.
    /// Late failures of sends admitted before the suspension are ignored, so
    /// only a failed retry extends the backoff.
    pub fn record_failure(&self, idx: EndpointIndex, now: Instant, retry: bool) -> HealthState {
        let mut health = self.entry(idx);
        if !retry && (health.state == HealthState::Suspended || health.retry_in_flight) {
            return health.state;
        }

        health.retry_in_flight = false;
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_failure = Some(now);
        health.state = if health.consecutive_failures >= self.policy.failure_threshold {
            HealthState::Suspended
        } else {
            HealthState::Degraded
        };
        health.state
    }

    /// Suspend immediately; used when the initial session open fails
    pub fn suspend(&self, idx: EndpointIndex, now: Instant) {
        let mut health = self.entry(idx);
        health.consecutive_failures = health
            .consecutive_failures
            .max(self.policy.failure_threshold);
        health.last_failure = Some(now);
        health.state = HealthState::Suspended;
    }

    pub fn state(&self, idx: EndpointIndex) -> HealthState {
        self.entry(idx).state
    }

    /// Copy of one entry
    pub fn health(&self, idx: EndpointIndex) -> EndpointHealth {
        self.entry(idx).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: EndpointIndex = EndpointIndex::new(0);
    const B: EndpointIndex = EndpointIndex::new(1);

    fn tracker(threshold: u32) -> FailureTracker {
        FailureTracker::new(
            BackoffPolicy {
                failure_threshold: threshold,
                base: Duration::from_millis(100),
                max: Duration::from_millis(1000),
            },
            ["dc1:9092".into(), "dc2:9092".into()],
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            failure_threshold: 3,
            base: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay(3), Duration::from_millis(100));
        assert_eq!(policy.delay(4), Duration::from_millis(200));
        assert_eq!(policy.delay(5), Duration::from_millis(400));
        assert_eq!(policy.delay(8), Duration::from_millis(1000));
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_failures_degrade_then_suspend() {
        let t = tracker(3);
        let now = Instant::now();

        assert_eq!(t.record_failure(A, now, false), HealthState::Degraded);
        assert_eq!(t.record_failure(A, now, false), HealthState::Degraded);
        assert_eq!(t.eligibility(A, now), Eligibility::Attempt);
        assert_eq!(t.record_failure(A, now, false), HealthState::Suspended);

        match t.eligibility(A, now) {
            Eligibility::Skip { retry_in } => assert_eq!(retry_in, Duration::from_millis(100)),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn test_entries_are_independent() {
        let t = tracker(1);
        let now = Instant::now();

        t.record_failure(A, now, false);
        assert_eq!(t.state(A), HealthState::Suspended);
        assert_eq!(t.state(B), HealthState::Healthy);
        assert_eq!(t.eligibility(B, now), Eligibility::Attempt);
    }

    #[test]
    fn test_single_retry_per_backoff_window() {
        let t = tracker(2);
        let now = Instant::now();
        t.record_failure(A, now, false);
        t.record_failure(A, now, false);

        let later = now + Duration::from_millis(100);
        assert_eq!(t.eligibility(A, later), Eligibility::Retry);
        assert_eq!(t.state(A), HealthState::Degraded);
        assert!(t.health(A).retry_in_flight);

        // Other callers wait for the pending retry
        for _ in 0..5 {
            assert_eq!(t.eligibility(A, later), Eligibility::AwaitRetry);
        }

        // Stale failures from before the suspension do not count meanwhile
        assert_eq!(t.record_failure(A, later, false), HealthState::Degraded);
        assert_eq!(t.health(A).consecutive_failures, 2);
    }

    #[test]
    fn test_failed_retry_doubles_backoff() {
        let t = tracker(2);
        let now = Instant::now();
        t.record_failure(A, now, false);
        t.record_failure(A, now, false);

        let retry_at = now + Duration::from_millis(100);
        assert_eq!(t.eligibility(A, retry_at), Eligibility::Retry);
        assert_eq!(t.record_failure(A, retry_at, true), HealthState::Suspended);
        assert!(!t.health(A).retry_in_flight);
        assert_eq!(t.health(A).consecutive_failures, 3);

        match t.eligibility(A, retry_at + Duration::from_millis(100)) {
            Eligibility::Skip { retry_in } => assert_eq!(retry_in, Duration::from_millis(100)),
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(
            t.eligibility(A, retry_at + Duration::from_millis(200)),
            Eligibility::Retry
        );
    }

    #[test]
    fn test_late_failures_do_not_extend_backoff() {
        let t = tracker(1);
        let now = Instant::now();
        assert_eq!(t.record_failure(A, now, false), HealthState::Suspended);

        // Sends admitted before the suspension report back afterwards
        for _ in 0..4 {
            assert_eq!(t.record_failure(A, now, false), HealthState::Suspended);
        }
        assert_eq!(t.health(A).consecutive_failures, 1);
        assert_eq!(
            t.eligibility(A, now + Duration::from_millis(100)),
            Eligibility::Retry
        );
    }

    #[test]
    fn test_success_resets() {
        let t = tracker(2);
        let now = Instant::now();
        t.record_failure(A, now, false);
        t.record_failure(A, now, false);
        assert_eq!(t.eligibility(A, now + Duration::from_millis(100)), Eligibility::Retry);
        assert_eq!(t.record_success(A), HealthState::Healthy);

        let health = t.health(A);
        assert_eq!(health.consecutive_failures, 0);
        assert!(!health.retry_in_flight);
        assert_eq!(health.endpoint_id, "dc1:9092");
        assert_eq!(t.eligibility(A, now), Eligibility::Attempt);
    }

    #[test]
    fn test_suspend_on_open_failure() {
        let t = tracker(3);
        let now = Instant::now();
        t.suspend(A, now);

        let health = t.health(A);
        assert_eq!(health.state, HealthState::Suspended);
        assert_eq!(health.consecutive_failures, 3);
        assert!(matches!(t.eligibility(A, now), Eligibility::Skip { .. }));
        assert_eq!(
            t.eligibility(A, now + Duration::from_millis(100)),
            Eligibility::Retry
        );
    }
}
