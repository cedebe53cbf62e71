//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式，RUST_LOG 优先)
//! - Prometheus 指标导出，所有指标带 `sink` 全局标签
//! - PublishOutcome 指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{LogFormat, ObservabilityConfig};
//!
//! observability::init_with_config(
//!     ObservabilityConfig::new("multi-dc").with_log_format(LogFormat::Json),
//! )?;
//!
//! // 需要指标时再单独开启 exporter
//! observability::init_metrics("multi-dc", 9464)?;
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    describe_metrics, record_destination_state, record_payload_bytes, record_publish_error,
    record_publish_outcome, record_queue_depth, DestinationCounts, MetricsSummary,
    PublishMetricsAggregator, RunningStats, StatsSummary,
};

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 服务 / sink 名称，写入启动日志与指标标签
    pub service: String,
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// RUST_LOG 未设置时的日志级别
    pub default_log_level: String,
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    #[default]
    Compact,
}

impl ObservabilityConfig {
    /// 紧凑日志、info 级别、不开启指标端口
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            log_format: LogFormat::default(),
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_default_log_level(mut self, level: impl Into<String>) -> Self {
        self.default_log_level = level.into();
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics(&config.service, port)?;
    }

    tracing::info!(
        service = %config.service,
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 所有指标带上 `sink = <service>` 标签，便于多个 sink 共用一个 Prometheus。
pub fn init_metrics(service: &str, port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .add_global_label("sink", service)
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on port {port}"))?;
    describe_metrics();

    tracing::info!(sink = service, port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config_disables_metrics() {
        let config = ObservabilityConfig::new("multi-dc");
        assert_eq!(config.service, "multi-dc");
        assert!(config.metrics_port.is_none());
        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(config.default_log_level, "info");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ObservabilityConfig::new("multi-dc")
            .with_log_format(LogFormat::Json)
            .with_default_log_level("debug")
            .with_metrics_port(9464);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_log_level, "debug");
        assert_eq!(config.metrics_port, Some(9464));
    }
}
