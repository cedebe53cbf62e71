//! # Multi-DC Sink CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 事件投递编排与生命周期管理
//! - 本地接收端 (listen)
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::{LogFormat, ObservabilityConfig};
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_listen, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Metrics are started by `run` itself when requested
    observability::init_with_config(logging_config(&cli))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Multi-DC sink CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Listen(args) => run_listen(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Map CLI logging options onto the observability config
fn logging_config(cli: &Cli) -> ObservabilityConfig {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    ObservabilityConfig::new("multidc-sink")
        .with_log_format(match cli.log_format {
            cli::LogFormat::Json => LogFormat::Json,
            cli::LogFormat::Pretty => LogFormat::Pretty,
            cli::LogFormat::Compact => LogFormat::Compact,
        })
        .with_default_log_level(default_log_level)
}
