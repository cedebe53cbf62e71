//! Fan-out error types

use contracts::{DestinationId, PublishOutcome};
use thiserror::Error;

/// Fan-out publisher errors
///
/// Per-destination failures never surface here on their own; they are recorded
/// in the `PublishOutcome`. Only call-level conditions become errors.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Invalid sink or destination configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Session open failed for one destination
    #[error("failed to connect to destination '{destination}': {message}")]
    Connection {
        destination: DestinationId,
        message: String,
    },

    /// Event could not be encoded; no destination was touched
    #[error("failed to encode event: {0}")]
    Encoding(#[source] contracts::ContractError),

    /// No eligible destination acknowledged the event
    #[error("event delivered to no destination ({outcome})")]
    AllDestinationsFailed { outcome: PublishOutcome },

    /// Some destinations acknowledged, but fewer than required
    #[error("event delivered to {delivered} destination(s), {required} required ({outcome})")]
    InsufficientDeliveries {
        delivered: usize,
        required: usize,
        outcome: PublishOutcome,
    },

    /// Zero destinations could be opened at start
    #[error("none of the {attempted} configured destination(s) is reachable")]
    NoReachableDestinations { attempted: usize },

    /// Sink error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl FanoutError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Per-destination outcome carried by call-level delivery failures
    pub fn outcome(&self) -> Option<&PublishOutcome> {
        match self {
            Self::AllDestinationsFailed { outcome }
            | Self::InsufficientDeliveries { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}
