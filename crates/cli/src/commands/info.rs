//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::SinkBlueprint;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    sink: SinkInfo,
    destinations: Vec<DestinationInfo>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    format: String,
    max_payload_bytes: usize,
    per_send_timeout_ms: u64,
    connect_timeout_ms: u64,
    failure_threshold: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    min_successful_destinations: usize,
    open_policy: String,
    queue_capacity: usize,
    shutdown_grace_ms: u64,
}

#[derive(Serialize)]
struct DestinationInfo {
    id: String,
    address: String,
    topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition: Option<i32>,
    transport: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn build_config_info(blueprint: &SinkBlueprint) -> ConfigInfo {
    let sink = &blueprint.sink;
    let destinations = blueprint
        .resolved_destinations()
        .into_iter()
        .map(|d| DestinationInfo {
            id: d.id().to_string(),
            address: d.address.clone(),
            topic: d.topic.clone(),
            partition: d.partition,
            transport: format!("{:?}", d.transport),
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        sink: SinkInfo {
            name: sink.name.clone(),
            format: format!("{:?}", sink.format),
            max_payload_bytes: sink.max_payload_bytes,
            per_send_timeout_ms: sink.per_send_timeout_ms,
            connect_timeout_ms: sink.connect_timeout_ms,
            failure_threshold: sink.failure_threshold,
            backoff_base_ms: sink.backoff_base_ms,
            backoff_max_ms: sink.backoff_max_ms,
            min_successful_destinations: sink.min_successful_destinations,
            open_policy: format!("{:?}", sink.open_policy),
            queue_capacity: sink.queue_capacity,
            shutdown_grace_ms: sink.shutdown_grace_ms,
        },
        destinations,
    }
}

fn print_config_info(blueprint: &SinkBlueprint) {
    let sink = &blueprint.sink;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Multi-DC Sink Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📤 Sink");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Name: {}", sink.name);
    println!(
        "   ├─ Format: {:?} (max {} bytes)",
        sink.format, sink.max_payload_bytes
    );
    println!(
        "   ├─ Timeouts: send {}ms, connect {}ms",
        sink.per_send_timeout_ms, sink.connect_timeout_ms
    );
    println!(
        "   ├─ Suspension: after {} failure(s), backoff {}ms..{}ms",
        sink.failure_threshold, sink.backoff_base_ms, sink.backoff_max_ms
    );
    println!(
        "   ├─ Min successful destinations: {}",
        sink.min_successful_destinations
    );
    println!("   ├─ Open policy: {:?}", sink.open_policy);
    println!("   ├─ Queue capacity: {}", sink.queue_capacity);
    println!("   └─ Shutdown grace: {}ms", sink.shutdown_grace_ms);

    let destinations = blueprint.resolved_destinations();
    println!("\n🌐 Destinations ({})", destinations.len());
    for (i, dest) in destinations.iter().enumerate() {
        let is_last = i == destinations.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let partition = dest
            .partition
            .map_or_else(|| "auto".to_string(), |p| p.to_string());
        println!(
            "   {} {} -> {} [partition {}] ({:?})",
            prefix, dest.address, dest.topic, partition, dest.transport
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DestinationConfig;

    #[test]
    fn test_info_lists_resolved_destinations() {
        let blueprint = SinkBlueprint {
            version: Default::default(),
            bootstrap_servers: Some("dc1:9092, dc2:9092".into()),
            topic: Some("orders".into()),
            partition: None,
            sink: Default::default(),
            destinations: Vec::new(),
        };
        let info = build_config_info(&blueprint);
        assert_eq!(info.destinations.len(), 2);
        assert!(info.destinations.iter().all(|d| d.topic == "orders"));
        assert!(info.destinations[0].partition.is_none());
    }

    #[test]
    fn test_info_json_includes_partition_when_fixed() {
        let blueprint = SinkBlueprint {
            version: Default::default(),
            bootstrap_servers: None,
            topic: None,
            partition: None,
            sink: Default::default(),
            destinations: vec![DestinationConfig::new("dc1:9092", "orders").with_partition(2)],
        };
        let json = serde_json::to_value(build_config_info(&blueprint)).unwrap();
        assert_eq!(json["destinations"][0]["partition"], 2);
        assert_eq!(json["sink"]["min_successful_destinations"], 1);
    }
}
