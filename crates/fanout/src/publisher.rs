//! FanoutPublisher - sends every event to every eligible destination
//!
//! One `publish` call encodes the event once, hands the payload to each
//! eligible endpoint concurrently and waits for all of them, each bounded by
//! the same per-send deadline. Health bookkeeping happens here and nowhere
//! else.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    DeliveryResult, DestinationOutcome, Event, FailureReason, PayloadEncoder, PublishOutcome,
    SessionState, SinkBlueprint, SinkSettings, SkipReason,
};

use crate::destination_set::{CloseReport, DestinationSet, DestinationSetBuilder};
use crate::encoder::encoder_for;
use crate::endpoint::{DestinationEndpoint, EndpointIndex};
use crate::error::FanoutError;
use crate::metrics::MetricsSnapshot;
use crate::tracker::{BackoffPolicy, Eligibility, EndpointHealth, FailureTracker, HealthState};

/// Publisher behaviour
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    /// Name used in logs
    pub name: String,
    /// Deadline for one destination's attempt, queueing and reconnect included
    pub per_send_timeout: Duration,
    /// Deliveries needed for a publish to count as successful
    pub min_successful_destinations: usize,
    pub backoff: BackoffPolicy,
    /// Time in-flight sends get to finish on shutdown
    pub shutdown_grace: Duration,
}

impl PublisherSettings {
    pub fn from_sink(sink: &SinkSettings) -> Self {
        Self {
            name: sink.name.clone(),
            per_send_timeout: sink.per_send_timeout(),
            min_successful_destinations: sink.min_successful_destinations,
            backoff: BackoffPolicy {
                failure_threshold: sink.failure_threshold,
                base: sink.backoff_base(),
                max: sink.backoff_max(),
            },
            shutdown_grace: sink.shutdown_grace(),
        }
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self::from_sink(&SinkSettings::default())
    }
}

/// Health report for one destination
#[derive(Debug, Clone, Serialize)]
pub struct DestinationStatus {
    pub address: String,
    pub topic: String,
    pub partition: Option<i32>,
    pub health: EndpointHealth,
    pub session: SessionState,
    pub metrics: MetricsSnapshot,
}

/// Multi-destination publisher
pub struct FanoutPublisher {
    settings: PublisherSettings,
    destinations: DestinationSet,
    tracker: FailureTracker,
    encoder: Arc<dyn PayloadEncoder>,
}

impl FanoutPublisher {
    /// Wrap an opened destination set
    ///
    /// Destinations that failed their initial open start out suspended.
    /// `min_successful_destinations` is clamped to `1..=destinations.len()`.
    pub fn new(
        destinations: DestinationSet,
        encoder: Arc<dyn PayloadEncoder>,
        mut settings: PublisherSettings,
    ) -> Self {
        let required = settings
            .min_successful_destinations
            .clamp(1, destinations.len().max(1));
        if required != settings.min_successful_destinations {
            warn!(
                requested = settings.min_successful_destinations,
                clamped = required,
                destinations = destinations.len(),
                "min_successful_destinations out of range"
            );
            settings.min_successful_destinations = required;
        }

        let tracker = FailureTracker::new(settings.backoff, destinations.ids().cloned());
        let now = Instant::now();
        for idx in destinations.unreachable_indices() {
            tracker.suspend(idx, now);
            if let Some(handle) = destinations.get(idx) {
                observability::record_destination_state(
                    handle.id().as_str(),
                    HealthState::Suspended.as_gauge(),
                );
            }
        }

        Self {
            settings,
            destinations,
            tracker,
            encoder,
        }
    }

    /// Open every destination of a validated blueprint
    #[instrument(name = "publisher_from_blueprint", skip_all, fields(sink = %blueprint.sink.name))]
    pub async fn from_blueprint(blueprint: &SinkBlueprint) -> Result<Self, FanoutError> {
        let destinations = DestinationSetBuilder::from_blueprint(blueprint)
            .open()
            .await?;
        let encoder = encoder_for(blueprint.sink.format, blueprint.sink.max_payload_bytes);
        Ok(Self::new(
            destinations,
            encoder,
            PublisherSettings::from_sink(&blueprint.sink),
        ))
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    pub fn destinations(&self) -> &DestinationSet {
        &self.destinations
    }

    pub fn health_state(&self, idx: EndpointIndex) -> HealthState {
        self.tracker.state(idx)
    }

    /// Current health, session state and counters per destination
    pub fn health(&self) -> Vec<DestinationStatus> {
        self.destinations
            .iter()
            .map(|handle| {
                let DestinationEndpoint {
                    address,
                    topic,
                    partition,
                    ..
                } = handle.endpoint().clone();
                DestinationStatus {
                    address,
                    topic,
                    partition,
                    health: self.tracker.health(handle.index()),
                    session: handle.session_state(),
                    metrics: handle.metrics().snapshot(),
                }
            })
            .collect()
    }

    /// Encode `event` once and deliver it to every eligible destination
    ///
    /// # Errors
    /// - `Encoding` if the event cannot be encoded; no destination is touched
    /// - `AllDestinationsFailed` if no destination acknowledged it
    /// - `InsufficientDeliveries` if fewer than `min_successful_destinations` did
    #[instrument(name = "publisher_publish", skip_all, fields(stream = %event.stream))]
    pub async fn publish(&self, event: &Event) -> Result<PublishOutcome, FanoutError> {
        let payload = self.encoder.encode(event).map_err(|e| {
            observability::record_publish_error("encoding");
            FanoutError::Encoding(e)
        })?;
        observability::record_payload_bytes(payload.len());
        self.publish_encoded(payload).await
    }

    /// Deliver an already-encoded payload
    #[instrument(name = "publisher_publish_encoded", skip_all, fields(bytes = payload.len()))]
    pub async fn publish_encoded(&self, payload: Bytes) -> Result<PublishOutcome, FanoutError> {
        let started = Instant::now();
        let deadline = started + self.settings.per_send_timeout;

        let mut results: Vec<Option<DeliveryResult>> = vec![None; self.destinations.len()];
        let mut retrying = vec![false; self.destinations.len()];
        let mut attempts = JoinSet::new();

        for handle in self.destinations.iter() {
            let idx = handle.index();
            let reason = match self.tracker.eligibility(idx, started) {
                Eligibility::Skip { retry_in } => Some(SkipReason::Suspended { retry_in }),
                Eligibility::AwaitRetry => Some(SkipReason::Retrying),
                Eligibility::Retry => {
                    info!(destination = %handle.id(), "Backoff elapsed, retrying destination");
                    retrying[idx.get()] = true;
                    None
                }
                Eligibility::Attempt => None,
            };

            match reason {
                Some(reason) => {
                    let skipped = DeliveryResult::Skipped { reason };
                    handle.metrics().record(&skipped);
                    results[idx.get()] = Some(skipped);
                }
                None => {
                    let attempt = handle.submit(payload.clone(), deadline);
                    attempts.spawn(async move { (idx, attempt.await) });
                }
            }
        }

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((idx, result)) => {
                    self.record_result(idx, &result, retrying[idx.get()]);
                    results[idx.get()] = Some(result);
                }
                Err(e) => error!(error = ?e, "Delivery task failed"),
            }
        }

        let entries = self
            .destinations
            .iter()
            .zip(results)
            .map(|(handle, result)| {
                let result = result.unwrap_or_else(|| {
                    let lost = DeliveryResult::Failed {
                        reason: FailureReason::WorkerUnavailable,
                    };
                    self.record_result(handle.index(), &lost, retrying[handle.index().get()]);
                    lost
                });
                DestinationOutcome {
                    destination: handle.id().clone(),
                    result,
                }
            })
            .collect();
        let outcome = PublishOutcome::new(entries);

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability::record_publish_outcome(&outcome, latency_ms);
        self.conclude(outcome)
    }

    /// Publish events one after another, in order
    ///
    /// Each event gets its own result; a failed event does not stop the batch.
    pub async fn publish_batch(&self, events: &[Event]) -> Vec<Result<PublishOutcome, FanoutError>> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.publish(event).await);
        }
        results
    }

    /// Close every destination, waiting up to the configured grace period
    #[instrument(name = "publisher_shutdown", skip_all, fields(sink = %self.settings.name))]
    pub async fn shutdown(self) -> CloseReport {
        info!(destinations = self.destinations.len(), "Shutting down publisher");
        self.destinations.close(self.settings.shutdown_grace).await
    }

    fn record_result(&self, idx: EndpointIndex, result: &DeliveryResult, retry: bool) {
        let Some(handle) = self.destinations.get(idx) else {
            return;
        };
        handle.metrics().record(result);

        let before = self.tracker.state(idx);
        let after = match result {
            DeliveryResult::Delivered(_) => self.tracker.record_success(idx),
            DeliveryResult::Failed { reason } => {
                debug!(destination = %handle.id(), %reason, "Delivery failed");
                self.tracker.record_failure(idx, Instant::now(), retry)
            }
            DeliveryResult::Skipped { .. } => before,
        };

        if before != after {
            match after {
                HealthState::Healthy => info!(destination = %handle.id(), "Destination recovered"),
                HealthState::Degraded => warn!(destination = %handle.id(), "Destination degraded"),
                HealthState::Suspended => {
                    let health = self.tracker.health(idx);
                    warn!(
                        destination = %handle.id(),
                        failures = health.consecutive_failures,
                        backoff_ms = self.tracker.policy().delay(health.consecutive_failures).as_millis() as u64,
                        "Destination suspended"
                    );
                }
            }
        }
        observability::record_destination_state(handle.id().as_str(), after.as_gauge());
        observability::record_queue_depth(handle.id().as_str(), handle.metrics().queue_len());
    }

    fn conclude(&self, outcome: PublishOutcome) -> Result<PublishOutcome, FanoutError> {
        let delivered = outcome.delivered_count();
        if delivered == 0 {
            warn!(%outcome, "Event delivered to no destination");
            observability::record_publish_error("all_destinations_failed");
            return Err(FanoutError::AllDestinationsFailed { outcome });
        }

        let required = self.settings.min_successful_destinations;
        if delivered < required {
            warn!(%outcome, required, "Event delivered to too few destinations");
            observability::record_publish_error("insufficient_deliveries");
            return Err(FanoutError::InsufficientDeliveries {
                delivered,
                required,
                outcome,
            });
        }

        if outcome.is_partial() {
            debug!(%outcome, "Partial delivery");
        }
        Ok(outcome)
    }
}
