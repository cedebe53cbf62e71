//! PublishOutcome - per-event, per-destination delivery report

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::{Ack, DestinationId};

/// Result of one event against one destination
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryResult {
    /// Broker acknowledged the record
    Delivered(Ack),
    /// Attempted and failed
    Failed { reason: FailureReason },
    /// Not attempted
    Skipped { reason: SkipReason },
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered(_) => "delivered",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// Per-send deadline exceeded (queueing, reconnect and send included)
    Timeout,
    /// Session could not be (re-)opened
    Connection(String),
    /// Broker returned an error for this record
    Send(String),
    /// Sink shut down while the send was in flight
    Cancelled,
    /// Destination worker is gone
    WorkerUnavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Send(msg) => write!(f, "send: {msg}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::WorkerUnavailable => f.write_str("worker unavailable"),
        }
    }
}

/// Why a destination was not attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Destination is suspended; it becomes eligible again after `retry_in`
    Suspended {
        #[serde(with = "duration_ms")]
        retry_in: Duration,
    },
    /// Destination is suspended and its single retry is still in flight
    Retrying,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspended { retry_in } => {
                write!(f, "suspended (retry in {}ms)", retry_in.as_millis())
            }
            Self::Retrying => f.write_str("suspended (retry in flight)"),
        }
    }
}

/// Outcome entry for one destination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationOutcome {
    pub destination: DestinationId,
    pub result: DeliveryResult,
}

/// Per-event outcome across every configured destination
///
/// Entries follow destination configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishOutcome {
    entries: Vec<DestinationOutcome>,
}

impl PublishOutcome {
    pub fn new(entries: Vec<DestinationOutcome>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DestinationOutcome] {
        &self.entries
    }

    /// Result for one destination
    pub fn get(&self, destination: &str) -> Option<&DeliveryResult> {
        self.entries
            .iter()
            .find(|e| e.destination == destination)
            .map(|e| &e.result)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn delivered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_failed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_skipped()).count()
    }

    /// Destinations that acknowledged the event
    pub fn delivered(&self) -> impl Iterator<Item = &DestinationId> {
        self.entries
            .iter()
            .filter(|e| e.result.is_delivered())
            .map(|e| &e.destination)
    }

    /// Some, but not all, destinations received the event
    pub fn is_partial(&self) -> bool {
        let delivered = self.delivered_count();
        delivered > 0 && delivered < self.entries.len()
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered={}/{} failed={} skipped={}",
            self.delivered_count(),
            self.len(),
            self.failed_count(),
            self.skipped_count()
        )
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
