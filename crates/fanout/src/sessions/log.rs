//! LogSession - logs record summaries via tracing instead of sending them

use bytes::Bytes;
use contracts::{Ack, BrokerSession, ContractError};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Session that logs every record and acknowledges it locally
///
/// Offsets are tracked per (topic, partition) so acks look like a broker's.
pub struct LogSession {
    address: String,
    offsets: HashMap<(String, i32), u64>,
    open: bool,
}

impl LogSession {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            offsets: HashMap::new(),
            open: false,
        }
    }

    fn next_offset(&mut self, topic: &str, partition: i32) -> u64 {
        let offset = self
            .offsets
            .entry((topic.to_string(), partition))
            .or_insert(0);
        let current = *offset;
        *offset += 1;
        current
    }
}

impl BrokerSession for LogSession {
    fn address(&self) -> &str {
        &self.address
    }

    async fn open(&mut self) -> Result<(), ContractError> {
        self.open = true;
        info!(destination = %self.address, "LogSession opened");
        Ok(())
    }

    #[instrument(
        name = "log_session_send",
        skip(self, payload),
        fields(destination = %self.address, bytes = payload.len())
    )]
    async fn send(
        &mut self,
        payload: Bytes,
        topic: &str,
        partition: Option<i32>,
    ) -> Result<Ack, ContractError> {
        if !self.open {
            return Err(ContractError::SessionNotOpen {
                destination: self.address.clone(),
            });
        }

        let partition = partition.unwrap_or(0);
        let offset = self.next_offset(topic, partition);
        info!(
            destination = %self.address,
            topic,
            partition,
            offset,
            bytes = payload.len(),
            "Record logged"
        );

        Ok(Ack {
            partition: Some(partition),
            offset: Some(offset),
        })
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.open = false;
        info!(destination = %self.address, "LogSession closed");
        Ok(())
    }
}
