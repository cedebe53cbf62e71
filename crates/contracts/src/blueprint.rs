//! SinkBlueprint - Config Loader 输出
//!
//! 描述一个多数据中心 sink：投递策略、失败阈值、退避参数与目标集群列表。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::DestinationId;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的 sink 配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 简写形式：逗号分隔的集群地址列表，共享同一 topic/partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_servers: Option<String>,

    /// 简写形式的 topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// 简写形式的 partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,

    /// 投递策略
    #[serde(default)]
    pub sink: SinkSettings,

    /// 显式目标列表
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<DestinationConfig>,
}

impl SinkBlueprint {
    /// 展开为最终的目标列表
    ///
    /// 显式列表优先；否则按 `bootstrap_servers` 逐个生成，空项被忽略。
    pub fn resolved_destinations(&self) -> Vec<DestinationConfig> {
        if !self.destinations.is_empty() {
            return self.destinations.clone();
        }

        let (Some(servers), Some(topic)) = (&self.bootstrap_servers, &self.topic) else {
            return Vec::new();
        };

        servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|address| DestinationConfig {
                address: address.to_string(),
                topic: topic.clone(),
                partition: self.partition,
                transport: TransportKind::default(),
            })
            .collect()
    }
}

/// 投递策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSettings {
    /// sink 名称 (日志/指标)
    #[serde(default = "default_sink_name")]
    pub name: String,

    /// payload 编码格式
    #[serde(default)]
    pub format: EncodingFormat,

    /// 单条 payload 最大字节数，超出视为编码失败
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// 单次发送超时 (毫秒)
    #[serde(default = "default_per_send_timeout_ms")]
    pub per_send_timeout_ms: u64,

    /// 建立连接超时 (毫秒)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// 连续失败多少次后挂起
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// 重试退避基数 (毫秒)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// 重试退避上限 (毫秒)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// 一次 publish 视为成功所需的最少投递数
    #[serde(default = "default_min_successful")]
    pub min_successful_destinations: usize,

    /// 启动时连接策略
    #[serde(default)]
    pub open_policy: OpenPolicy,

    /// 每个目标的发送队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 关闭时等待在途发送的宽限期 (毫秒)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl SinkSettings {
    pub fn per_send_timeout(&self) -> Duration {
        Duration::from_millis(self.per_send_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            name: default_sink_name(),
            format: EncodingFormat::default(),
            max_payload_bytes: default_max_payload_bytes(),
            per_send_timeout_ms: default_per_send_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            min_successful_destinations: default_min_successful(),
            open_policy: OpenPolicy::default(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_sink_name() -> String {
    "multi-dc".to_string()
}

fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

fn default_per_send_timeout_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_min_successful() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_shutdown_grace_ms() -> u64 {
    3000
}

/// 启动时连接策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenPolicy {
    /// 至少一个目标连接成功，否则启动失败
    #[default]
    RequireReachable,
    /// 永不失败，全部不可达时也启动
    BestEffort,
}

/// payload 编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingFormat {
    /// JSON (可读)
    #[default]
    Json,
    /// Bincode (紧凑二进制)
    Bincode,
}

/// 单个目标集群配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// 集群地址 (host:port)
    pub address: String,

    /// 目标 topic
    pub topic: String,

    /// 固定 partition；为空时由 broker 分配
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,

    /// 传输方式
    #[serde(default)]
    pub transport: TransportKind,
}

impl DestinationConfig {
    pub fn new(address: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            topic: topic.into(),
            partition: None,
            transport: TransportKind::default(),
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    /// 由地址派生的目标 ID
    pub fn id(&self) -> DestinationId {
        DestinationId::from_address(&self.address)
    }
}

/// 传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// 长度前缀帧 TCP 会话
    #[default]
    Tcp,
    /// 仅写日志，不做网络发送
    Log,
}
