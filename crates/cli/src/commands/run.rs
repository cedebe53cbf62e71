//! `run` command implementation.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use contracts::SinkBlueprint;

use super::shutdown_signal;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{EventSource, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args)?;

    info!(
        sink = %blueprint.sink.name,
        format = ?blueprint.sink.format,
        destinations = blueprint.resolved_destinations().len(),
        min_successful = blueprint.sink.min_successful_destinations,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let source = match (args.generate, &args.input) {
        (Some(count), _) => EventSource::Generated {
            count,
            interval: Duration::from_millis(args.interval_ms),
        },
        (None, Some(path)) => EventSource::Lines(path.clone()),
        (None, None) => EventSource::Lines(PathBuf::from("-")),
    };

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        source,
        buffer_size: 256,
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
    });

    info!("Starting publish loop...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        published = stats.events_published,
        failed = stats.events_failed,
        duration_secs = stats.duration.as_secs_f64(),
        events_per_sec = format!("{:.2}", stats.events_per_sec()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Multi-DC sink finished");
    Ok(())
}

/// Apply CLI overrides and re-validate
fn apply_overrides(blueprint: &mut SinkBlueprint, args: &RunArgs) -> Result<()> {
    let mut changed = false;

    if let Some(ref servers) = args.bootstrap_servers {
        info!(servers = %servers, "Overriding bootstrap servers from CLI");
        if blueprint.topic.is_none() {
            // Keep the topic of the first configured destination
            blueprint.topic = blueprint.destinations.first().map(|d| d.topic.clone());
            blueprint.partition = blueprint.destinations.first().and_then(|d| d.partition);
        }
        blueprint.bootstrap_servers = Some(servers.clone());
        blueprint.destinations.clear();
        changed = true;
    }
    if let Some(min) = args.min_successful {
        info!(min, "Overriding min_successful_destinations from CLI");
        blueprint.sink.min_successful_destinations = min;
        changed = true;
    }

    if changed {
        config_loader::ConfigLoader::validate(blueprint)
            .context("Configuration invalid after CLI overrides")?;
    }
    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &SinkBlueprint) {
    let sink = &blueprint.sink;
    println!("\n=== Configuration Summary ===\n");
    println!("Sink: {}", sink.name);
    println!("  Format: {:?}", sink.format);
    println!("  Per-send timeout: {}ms", sink.per_send_timeout_ms);
    println!(
        "  Failure threshold: {} (backoff {}ms..{}ms)",
        sink.failure_threshold, sink.backoff_base_ms, sink.backoff_max_ms
    );
    println!("  Min successful destinations: {}", sink.min_successful_destinations);
    println!("  Open policy: {:?}", sink.open_policy);

    let destinations = blueprint.resolved_destinations();
    println!("\nDestinations ({}):", destinations.len());
    for dest in &destinations {
        let partition = dest
            .partition
            .map_or_else(|| "auto".to_string(), |p| p.to_string());
        println!(
            "  - {} -> {} [partition {}] ({:?})",
            dest.address, dest.topic, partition, dest.transport
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DestinationConfig;

    fn args() -> RunArgs {
        RunArgs {
            config: PathBuf::from("sink.toml"),
            input: None,
            generate: None,
            interval_ms: 0,
            bootstrap_servers: None,
            min_successful: None,
            dry_run: false,
            metrics_port: 0,
        }
    }

    fn blueprint() -> SinkBlueprint {
        SinkBlueprint {
            version: Default::default(),
            bootstrap_servers: None,
            topic: None,
            partition: None,
            sink: Default::default(),
            destinations: vec![DestinationConfig::new("dc1:9092", "orders").with_partition(1)],
        }
    }

    #[test]
    fn test_bootstrap_override_keeps_topic() {
        let mut bp = blueprint();
        let args = RunArgs {
            bootstrap_servers: Some("dc1:9092,dc2:9092".into()),
            ..args()
        };
        apply_overrides(&mut bp, &args).unwrap();

        let dests = bp.resolved_destinations();
        assert_eq!(dests.len(), 2);
        assert!(dests.iter().all(|d| d.topic == "orders" && d.partition == Some(1)));
    }

    #[test]
    fn test_invalid_min_successful_override_rejected() {
        let mut bp = blueprint();
        let args = RunArgs {
            min_successful: Some(3),
            ..args()
        };
        assert!(apply_overrides(&mut bp, &args).is_err());
    }
}
