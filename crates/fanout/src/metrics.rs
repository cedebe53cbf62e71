//! Endpoint metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::{DeliveryResult, FailureReason};

/// Metrics for a single destination endpoint
#[derive(Debug, Default)]
pub struct EndpointMetrics {
    /// Sends waiting in the endpoint queue
    queue_len: AtomicUsize,
    /// Total acknowledged sends
    delivered_count: AtomicU64,
    /// Total failed sends (timeouts included)
    failure_count: AtomicU64,
    /// Subset of failures caused by the per-send deadline
    timeout_count: AtomicU64,
    /// Events not attempted because the endpoint was suspended
    skipped_count: AtomicU64,
    /// Successful session (re-)opens
    reconnect_count: AtomicU64,
}

impl EndpointMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped_count.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub fn inc_reconnect_count(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one delivery result
    pub fn record(&self, result: &DeliveryResult) {
        match result {
            DeliveryResult::Delivered(_) => {
                self.delivered_count.fetch_add(1, Ordering::Relaxed);
            }
            DeliveryResult::Failed { reason } => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                if *reason == FailureReason::Timeout {
                    self.timeout_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            DeliveryResult::Skipped { .. } => {
                self.skipped_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            delivered_count: self.delivered_count(),
            failure_count: self.failure_count(),
            timeout_count: self.timeout_count(),
            skipped_count: self.skipped_count(),
            reconnect_count: self.reconnect_count(),
        }
    }
}

/// Snapshot of endpoint metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub delivered_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub skipped_count: u64,
    pub reconnect_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Ack, SkipReason};
    use std::time::Duration;

    #[test]
    fn test_record_classifies_results() {
        let metrics = EndpointMetrics::new();
        metrics.record(&DeliveryResult::Delivered(Ack::default()));
        metrics.record(&DeliveryResult::Failed {
            reason: FailureReason::Timeout,
        });
        metrics.record(&DeliveryResult::Failed {
            reason: FailureReason::Send("rejected".into()),
        });
        metrics.record(&DeliveryResult::Skipped {
            reason: SkipReason::Suspended {
                retry_in: Duration::from_millis(10),
            },
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.delivered_count, 1);
        assert_eq!(snap.failure_count, 2);
        assert_eq!(snap.timeout_count, 1);
        assert_eq!(snap.skipped_count, 1);
    }
}
