//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{OpenPolicy, SinkBlueprint, TransportKind};

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    sink_name: String,
    destination_count: usize,
    min_successful_destinations: usize,
    failure_threshold: u32,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    sink_name: blueprint.sink.name.clone(),
                    destination_count: blueprint.resolved_destinations().len(),
                    min_successful_destinations: blueprint.sink.min_successful_destinations,
                    failure_threshold: blueprint.sink.failure_threshold,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SinkBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let destinations = blueprint.resolved_destinations();
    let sink = &blueprint.sink;

    if destinations.len() == 1 {
        warnings.push("Only one destination configured - no cross-datacenter redundancy".to_string());
    }

    if sink.min_successful_destinations == destinations.len() && destinations.len() > 1 {
        warnings.push(
            "min_successful_destinations equals the destination count - any single outage fails every publish"
                .to_string(),
        );
    }

    if sink.connect_timeout_ms > sink.per_send_timeout_ms {
        warnings.push(format!(
            "connect_timeout_ms ({}) exceeds per_send_timeout_ms ({}) - reconnects will be cut short by the send deadline",
            sink.connect_timeout_ms, sink.per_send_timeout_ms
        ));
    }

    if sink.open_policy == OpenPolicy::BestEffort {
        warnings.push("open_policy = best_effort - the sink starts even if no destination is reachable".to_string());
    }

    for dest in &destinations {
        if dest.transport == TransportKind::Log {
            warnings.push(format!(
                "Destination '{}' uses the log transport - records are not sent anywhere",
                dest.address
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Sink: {}", summary.sink_name);
            println!("  Destinations: {}", summary.destination_count);
            println!(
                "  Min successful destinations: {}",
                summary.min_successful_destinations
            );
            println!("  Failure threshold: {}", summary.failure_threshold);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
