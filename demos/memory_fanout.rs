//! In-process fan-out demo
//!
//! Publishes to two in-memory clusters, takes one of them down halfway
//! through and brings it back, printing every outcome along the way.
//!
//! Run with: cargo run -p multidc_sink_demos --bin memory_fanout

use std::time::Duration;

use contracts::{DestinationConfig, Event, OpenPolicy, SinkSettings};
use fanout::{
    encoder_for, DestinationSetBuilder, FanoutPublisher, MemoryBroker, PublisherSettings,
    WorkerSettings,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_with_config(observability::ObservabilityConfig::new("memory-demo"))?;

    tracing::info!("Starting in-memory fan-out demo");

    let sink = SinkSettings {
        name: "memory-demo".into(),
        per_send_timeout_ms: 200,
        failure_threshold: 2,
        backoff_base_ms: 300,
        ..Default::default()
    };

    let dc1 = MemoryBroker::new("dc1:9092");
    let dc2 = MemoryBroker::new("dc2:9092");
    let destinations = DestinationSetBuilder::new(WorkerSettings::default(), OpenPolicy::BestEffort)
        .session(&DestinationConfig::new(dc1.name(), "myTopic"), dc1.session())
        .session(&DestinationConfig::new(dc2.name(), "myTopic"), dc2.session())
        .open()
        .await?;

    let publisher = FanoutPublisher::new(
        destinations,
        encoder_for(sink.format, sink.max_payload_bytes),
        PublisherSettings::from_sink(&sink),
    );

    for i in 0..12i64 {
        match i {
            3 => {
                tracing::warn!("Taking dc2 down");
                dc2.set_reachable(false);
            }
            8 => {
                tracing::info!("Bringing dc2 back");
                dc2.set_reachable(true);
                tokio::time::sleep(Duration::from_millis(400)).await;
            }
            _ => {}
        }

        let event = Event::new("StockStream")
            .with("symbol", "WSO2")
            .with("price", 55.6 + i as f64)
            .with("volume", 100 + i);
        match publisher.publish(&event).await {
            Ok(outcome) => println!("event {i:>2}: {outcome}"),
            Err(e) => println!("event {i:>2}: error: {e}"),
        }
    }

    for status in publisher.health() {
        println!(
            "{}: {:?}, delivered {}, skipped {}",
            status.address,
            status.health.state,
            status.metrics.delivered_count,
            status.metrics.skipped_count
        );
    }

    let report = publisher.shutdown().await;
    tracing::info!(
        closed = report.closed.len(),
        failed = report.failed.len(),
        dc1_records = dc1.total_records(),
        dc2_records = dc2.total_records(),
        "Demo finished"
    );
    Ok(())
}
