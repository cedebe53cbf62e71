//! Pipeline orchestrator - feeds events from a source into the publisher.

use std::future::Future;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{Event, SinkBlueprint};
use fanout::FanoutPublisher;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::source::{EventSource, SourceItem};
use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The sink blueprint configuration
    pub blueprint: SinkBlueprint,

    /// Where events come from
    pub source: EventSource,

    /// Channel buffer size between source and publisher
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the source is exhausted or `shutdown` resolves
    ///
    /// The publisher is always shut down before returning, so every
    /// destination session gets closed.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics(&blueprint.sink.name, port)?;
        }

        info!(
            sink = %blueprint.sink.name,
            destinations = blueprint.resolved_destinations().len(),
            "Opening destinations..."
        );
        let publisher = FanoutPublisher::from_blueprint(blueprint)
            .await
            .context("Failed to open destinations")?;

        let mut stats = PipelineStats {
            destinations: publisher.destinations().len(),
            ..Default::default()
        };
        for unreachable in publisher.destinations().unreachable() {
            warn!(error = %unreachable, "Starting with destination suspended");
        }

        let (tx, mut rx) = mpsc::channel::<SourceItem>(self.config.buffer_size.max(1));
        let source_task = tokio::spawn(self.config.source.clone().feed(tx));

        tokio::pin!(shutdown);
        loop {
            let item = tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping publish loop");
                    break;
                }
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            match item {
                Ok(event) => publish_one(&publisher, &event, &mut stats).await,
                Err(e) => {
                    warn!(error = %e, "Skipping invalid input");
                    stats.invalid_lines += 1;
                }
            }
        }

        // Stop reading input; a source error is reported but does not lose the stats
        drop(rx);
        if source_task.is_finished() {
            match source_task.await {
                Ok(Ok(produced)) => debug!(produced, "Source finished"),
                Ok(Err(e)) => warn!(error = %e, "Event source failed"),
                Err(e) => warn!(error = %e, "Event source task failed"),
            }
        } else {
            source_task.abort();
        }

        info!("Shutting down publisher...");
        stats.final_health = publisher.health();
        stats.close_report = publisher.shutdown().await;
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            published = stats.events_published,
            failed = stats.events_failed,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

async fn publish_one(publisher: &FanoutPublisher, event: &Event, stats: &mut PipelineStats) {
    stats.events_read += 1;
    let started = Instant::now();
    let result = publisher.publish(event).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(outcome) => {
            stats.events_published += 1;
            if outcome.is_partial() {
                stats.events_partial += 1;
            }
            stats.publish_metrics.update(&outcome, latency_ms);
            debug!(stream = %event.stream, %outcome, "Event published");
        }
        Err(e) => {
            stats.events_failed += 1;
            if let Some(outcome) = e.outcome() {
                stats.publish_metrics.update(outcome, latency_ms);
            }
            stats.publish_metrics.record_error();
            warn!(stream = %event.stream, error = %e, "Publish failed");
        }
    }
}
