//! Pipeline statistics and metrics.

use std::time::Duration;

use fanout::{CloseReport, DestinationStatus};
use observability::PublishMetricsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Events handed to the publisher
    pub events_read: u64,

    /// Publish calls that returned an outcome
    pub events_published: u64,

    /// Published events that missed at least one destination
    pub events_partial: u64,

    /// Publish calls that failed (encoding, no or too few deliveries)
    pub events_failed: u64,

    /// Input lines that were not valid events
    pub invalid_lines: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Number of configured destinations
    pub destinations: usize,

    /// Publish metrics aggregator
    pub publish_metrics: PublishMetricsAggregator,

    /// Destination health just before shutdown
    pub final_health: Vec<DestinationStatus>,

    /// Session close results
    pub close_report: CloseReport,
}

impl PipelineStats {
    /// Published events per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_published as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Failed publish calls as a percentage of events read
    pub fn failure_rate(&self) -> f64 {
        if self.events_read > 0 {
            (self.events_failed as f64 / self.events_read as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Publish Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Events read: {}", self.events_read);
        println!("   ├─ Published: {}", self.events_published);
        println!("   ├─ Partial: {}", self.events_partial);
        println!(
            "   ├─ Failed: {} ({:.2}%)",
            self.events_failed,
            self.failure_rate()
        );
        println!("   ├─ Invalid input lines: {}", self.invalid_lines);
        println!("   ├─ Events/s: {:.2}", self.events_per_sec());
        println!("   └─ Destinations: {}", self.destinations);

        let summary = self.publish_metrics.summary();
        println!("\n📈 Delivery");
        println!("   ├─ Publish latency (ms): {}", summary.latency_ms);
        for (destination, counts) in &summary.per_destination {
            println!(
                "   ├─ {}: delivered={} failed={} skipped={}",
                destination, counts.delivered, counts.failed, counts.skipped
            );
        }
        println!("   └─ Undelivered events: {}", summary.undelivered);

        if !self.final_health.is_empty() {
            println!("\n🩺 Destination Health");
            for status in &self.final_health {
                println!(
                    "   ├─ {} [{}]: {:?}, session {}, {} consecutive failure(s), {} reconnect(s)",
                    status.address,
                    status.topic,
                    status.health.state,
                    status.session,
                    status.health.consecutive_failures,
                    status.metrics.reconnect_count
                );
            }
        }

        if !self.close_report.failed.is_empty() {
            println!("\n⚠️  Close Failures");
            for (destination, error) in &self.close_report.failed {
                println!("   ├─ {}: {}", destination, error);
            }
        }

        println!();
    }
}
