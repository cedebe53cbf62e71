//! BrokerSession implementations
//!
//! Contains LogSession, MemorySession (backed by an in-process MemoryBroker)
//! and TcpSession, plus the TCP wire format and a matching receiver.

mod log;
mod memory;
mod receiver;
mod tcp;
pub mod wire;

pub use self::log::LogSession;
pub use self::memory::{MemoryBroker, MemorySession, StoredRecord};
pub use self::receiver::{ReceivedRecord, TcpReceiver};
pub use self::tcp::TcpSession;
