//! Publish 指标收集模块
//!
//! 基于 PublishOutcome 收集和统计多数据中心投递的运行指标。

use std::collections::BTreeMap;

use contracts::{DeliveryResult, PublishOutcome};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 注册所有 sink 指标的说明
///
/// 在安装 recorder 之后调用一次，exporter 会输出 HELP / 单位信息。
pub fn describe_metrics() {
    describe_counter!("multidc_sink_events_total", "Events handed to the publisher");
    describe_counter!(
        "multidc_sink_events_partial_total",
        "Events that missed at least one destination"
    );
    describe_counter!(
        "multidc_sink_deliveries_total",
        "Per-destination delivery results, by destination and status"
    );
    describe_counter!(
        "multidc_sink_publish_errors_total",
        "Publish calls that failed, by kind"
    );
    describe_histogram!(
        "multidc_sink_publish_latency_ms",
        Unit::Milliseconds,
        "Time from publish to the last destination result"
    );
    describe_histogram!(
        "multidc_sink_payload_bytes",
        Unit::Bytes,
        "Encoded payload size"
    );
    describe_gauge!(
        "multidc_sink_last_delivered_destinations",
        "Destinations that acknowledged the latest event"
    );
    describe_gauge!(
        "multidc_sink_destination_state",
        "Destination health (0=healthy, 1=degraded, 2=suspended)"
    );
    describe_gauge!(
        "multidc_sink_queue_depth",
        "Sends waiting in a destination's queue"
    );
}

/// 从 PublishOutcome 记录指标
///
/// 每次 publish 返回 (无论成功与否) 时调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_publish_outcome;
///
/// let started = Instant::now();
/// let outcome = publisher.publish(&event).await?;
/// record_publish_outcome(&outcome, started.elapsed().as_secs_f64() * 1000.0);
/// ```
pub fn record_publish_outcome(outcome: &PublishOutcome, latency_ms: f64) {
    counter!("multidc_sink_events_total").increment(1);
    histogram!("multidc_sink_publish_latency_ms").record(latency_ms);

    for entry in outcome.entries() {
        counter!(
            "multidc_sink_deliveries_total",
            "destination" => entry.destination.to_string(),
            "status" => entry.result.label()
        )
        .increment(1);
    }

    let delivered = outcome.delivered_count();
    gauge!("multidc_sink_last_delivered_destinations").set(delivered as f64);
    if outcome.is_partial() {
        counter!("multidc_sink_events_partial_total").increment(1);
    }
}

/// 记录调用级失败 (编码失败、全部失败、投递数不足)
pub fn record_publish_error(kind: &'static str) {
    counter!("multidc_sink_publish_errors_total", "kind" => kind).increment(1);
}

/// 记录目标健康状态 (0=healthy, 1=degraded, 2=suspended)
pub fn record_destination_state(destination: &str, state: f64) {
    gauge!(
        "multidc_sink_destination_state",
        "destination" => destination.to_string()
    )
    .set(state);
}

/// 记录目标发送队列深度
pub fn record_queue_depth(destination: &str, depth: usize) {
    gauge!(
        "multidc_sink_queue_depth",
        "destination" => destination.to_string()
    )
    .set(depth as f64);
}

/// 记录编码后的 payload 大小
pub fn record_payload_bytes(bytes: usize) {
    histogram!("multidc_sink_payload_bytes").record(bytes as f64);
}

/// 单个目标的累计结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestinationCounts {
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Publish 指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PublishMetricsAggregator {
    /// 总事件数 (有 outcome 的)
    pub total_events: u64,

    /// 所有目标都投递成功的事件数
    pub fully_delivered: u64,

    /// 部分目标投递成功的事件数
    pub partially_delivered: u64,

    /// 没有任何目标投递成功的事件数
    pub undelivered: u64,

    /// 调用级错误数 (编码失败等)
    pub errors: u64,

    /// publish 延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 各目标累计结果
    pub per_destination: BTreeMap<String, DestinationCounts>,
}

impl PublishMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, outcome: &PublishOutcome, latency_ms: f64) {
        self.total_events += 1;
        self.latency_stats.push(latency_ms);

        let delivered = outcome.delivered_count();
        if delivered == 0 {
            self.undelivered += 1;
        } else if delivered == outcome.len() {
            self.fully_delivered += 1;
        } else {
            self.partially_delivered += 1;
        }

        for entry in outcome.entries() {
            let counts = self
                .per_destination
                .entry(entry.destination.to_string())
                .or_default();
            match entry.result {
                DeliveryResult::Delivered(_) => counts.delivered += 1,
                DeliveryResult::Failed { .. } => counts.failed += 1,
                DeliveryResult::Skipped { .. } => counts.skipped += 1,
            }
        }
    }

    /// 记录一次调用级错误
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let rate = |n: u64| {
            if self.total_events > 0 {
                n as f64 / self.total_events as f64 * 100.0
            } else {
                0.0
            }
        };

        MetricsSummary {
            total_events: self.total_events,
            fully_delivered: self.fully_delivered,
            partially_delivered: self.partially_delivered,
            undelivered: self.undelivered,
            errors: self.errors,
            full_rate: rate(self.fully_delivered),
            partial_rate: rate(self.partially_delivered),
            latency_ms: StatsSummary::from(&self.latency_stats),
            per_destination: self.per_destination.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_events: u64,
    pub fully_delivered: u64,
    pub partially_delivered: u64,
    pub undelivered: u64,
    pub errors: u64,
    pub full_rate: f64,
    pub partial_rate: f64,
    pub latency_ms: StatsSummary,
    pub per_destination: BTreeMap<String, DestinationCounts>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Publish Metrics Summary ===")?;
        writeln!(f, "Total events: {}", self.total_events)?;
        writeln!(
            f,
            "Fully delivered: {} ({:.2}%)",
            self.fully_delivered, self.full_rate
        )?;
        writeln!(
            f,
            "Partially delivered: {} ({:.2}%)",
            self.partially_delivered, self.partial_rate
        )?;
        writeln!(f, "Undelivered: {}", self.undelivered)?;
        writeln!(f, "Call errors: {}", self.errors)?;
        writeln!(f, "Publish latency (ms): {}", self.latency_ms)?;

        if !self.per_destination.is_empty() {
            writeln!(f, "Per destination:")?;
            for (destination, counts) in &self.per_destination {
                writeln!(
                    f,
                    "  {}: delivered={} failed={} skipped={}",
                    destination, counts.delivered, counts.failed, counts.skipped
                )?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
