//! # Fanout
//!
//! 多数据中心投递模块。
//!
//! 负责：
//! - 每个事件编码一次，投递到所有目标集群
//! - 每个目标独立队列与 worker，慢目标不阻塞其他目标
//! - 按目标统计连续失败，挂起并按指数退避重新探测
//! - 以 `PublishOutcome` 报告逐目标结果

pub mod destination_set;
pub mod encoder;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod sessions;
pub mod tracker;

pub use contracts::{BrokerSession, PayloadEncoder, PublishOutcome};
pub use destination_set::{CloseReport, DestinationSet, DestinationSetBuilder};
pub use encoder::{encoder_for, BincodeEncoder, JsonEncoder};
pub use endpoint::{DestinationEndpoint, EndpointHandle, EndpointIndex, WorkerSettings};
pub use error::FanoutError;
pub use metrics::{EndpointMetrics, MetricsSnapshot};
pub use publisher::{DestinationStatus, FanoutPublisher, PublisherSettings};
pub use sessions::{LogSession, MemoryBroker, MemorySession, TcpReceiver, TcpSession};
pub use tracker::{BackoffPolicy, Eligibility, EndpointHealth, FailureTracker, HealthState};
