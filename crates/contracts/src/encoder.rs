//! PayloadEncoder trait - event to wire payload

use bytes::Bytes;

use crate::{ContractError, Event};

/// Turns an event into the opaque payload handed to every destination.
///
/// Encoding happens once per event, before fan-out. Implementations must be
/// synchronous and free of side effects; a failure is a per-event user error,
/// not a delivery failure.
pub trait PayloadEncoder: Send + Sync {
    /// Short format name used in logs and errors (e.g. "json")
    fn format(&self) -> &str;

    /// Encode one event
    ///
    /// # Errors
    /// Returns `ContractError::Encoding` if the event cannot be represented
    fn encode(&self, event: &Event) -> Result<Bytes, ContractError>;
}
