//! BrokerSession trait - per-destination broker capability
//!
//! Defines the abstract interface the publisher consumes for one broker cluster.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ContractError;

/// Broker acknowledgement for one delivered record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {
    /// Partition the record landed in (as assigned by the broker)
    pub partition: Option<i32>,
    /// Offset within the partition, when the broker reports one
    pub offset: Option<u64>,
}

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Closed,
    Open,
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Broker session trait
///
/// One instance per destination, owned exclusively by that destination's
/// worker. Sends are issued one at a time in submission order; the caller
/// bounds every call with its own deadline, so implementations must be
/// cancel-safe at await points (a cancelled send leaves the session `Faulted`
/// and it will be re-opened before the next send).
#[trait_variant::make(BrokerSession: Send)]
pub trait LocalBrokerSession {
    /// Address of the cluster this session talks to (used for logging)
    fn address(&self) -> &str;

    /// Establish the connection
    ///
    /// Called once at sink start and again lazily after a fault.
    async fn open(&mut self) -> Result<(), ContractError>;

    /// Send one encoded payload
    ///
    /// `partition = None` lets the broker's own partitioner choose.
    async fn send(
        &mut self,
        payload: Bytes,
        topic: &str,
        partition: Option<i32>,
    ) -> Result<Ack, ContractError>;

    /// Release the connection
    async fn close(&mut self) -> Result<(), ContractError>;
}
