//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Delivery Model
//! - An `Event` is encoded once by a `PayloadEncoder`
//! - The resulting payload is sent to every destination through its own `BrokerSession`
//! - Per-destination results are reported as a `PublishOutcome`, never a single boolean

mod blueprint;
mod destination_id;
mod encoder;
mod error;
mod event;
mod outcome;
mod session;

pub use blueprint::*;
pub use destination_id::DestinationId;
pub use encoder::PayloadEncoder;
pub use error::*;
pub use event::*;
pub use outcome::*;
pub use session::*;
