//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Multi-DC Sink - publish every event to several broker clusters at once
#[derive(Parser, Debug)]
#[command(
    name = "multidc-sink",
    author,
    version,
    about = "Multi-datacenter fan-out event sink",
    long_about = "Publishes every event to each configured broker cluster independently.\n\n\
                  A slow or unreachable cluster never blocks delivery to the others; \n\
                  failing clusters are suspended and retried with exponential backoff."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MULTIDC_SINK_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MULTIDC_SINK_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the sink and publish events
    Run(RunArgs),

    /// Run a minimal receiving broker speaking the TCP wire format
    Listen(ListenArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "sink.toml", env = "MULTIDC_SINK_CONFIG")]
    pub config: PathBuf,

    /// JSON-lines event file ("-" for stdin)
    #[arg(short, long, conflicts_with = "generate")]
    pub input: Option<PathBuf>,

    /// Publish N generated sample events instead of reading input
    #[arg(long)]
    pub generate: Option<u64>,

    /// Delay between generated events in milliseconds
    #[arg(long, default_value = "100", env = "MULTIDC_SINK_INTERVAL_MS")]
    pub interval_ms: u64,

    /// Override the comma separated bootstrap server list
    #[arg(long, env = "MULTIDC_SINK_BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: Option<String>,

    /// Override minimum successful destinations per event
    #[arg(long, env = "MULTIDC_SINK_MIN_SUCCESSFUL")]
    pub min_successful: Option<usize>,

    /// Validate configuration and exit without opening destinations
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "MULTIDC_SINK_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `listen` command
#[derive(Parser, Debug, Clone)]
pub struct ListenArgs {
    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1:9092", env = "MULTIDC_SINK_LISTEN")]
    pub bind: String,

    /// Stop after receiving this many records (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_records: u64,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sink.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sink.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
