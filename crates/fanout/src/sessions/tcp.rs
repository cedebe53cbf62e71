//! TcpSession - length-prefixed records over a persistent TCP connection

use bytes::Bytes;
use contracts::{Ack, BrokerSession, ContractError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use super::wire;

/// Session that writes each record as one frame and waits for its ack
pub struct TcpSession {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpSession {
    /// `address` may carry a `tcp://` scheme
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stream: None,
        }
    }

    fn socket_addr(&self) -> &str {
        let addr = self
            .address
            .split_once("://")
            .map_or(self.address.as_str(), |(_, rest)| rest);
        addr.trim_end_matches('/')
    }

    fn connection_error(&self, e: impl std::fmt::Display) -> ContractError {
        ContractError::session_connection(&self.address, e.to_string())
    }
}

impl BrokerSession for TcpSession {
    fn address(&self) -> &str {
        &self.address
    }

    #[instrument(name = "tcp_session_open", skip(self), fields(destination = %self.address))]
    async fn open(&mut self) -> Result<(), ContractError> {
        // Drop any half-dead stream from a previous fault
        self.stream = None;

        let stream = TcpStream::connect(self.socket_addr())
            .await
            .map_err(|e| self.connection_error(e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| self.connection_error(e))?;

        debug!(destination = %self.address, "TcpSession connected");
        self.stream = Some(stream);
        Ok(())
    }

    #[instrument(
        name = "tcp_session_send",
        skip(self, payload),
        fields(destination = %self.address, bytes = payload.len())
    )]
    async fn send(
        &mut self,
        payload: Bytes,
        topic: &str,
        partition: Option<i32>,
    ) -> Result<Ack, ContractError> {
        let body = wire::encode_record(topic, partition, &payload)
            .map_err(|e| ContractError::session_send(&self.address, e.to_string()))?;

        let Some(stream) = self.stream.as_mut() else {
            return Err(ContractError::SessionNotOpen {
                destination: self.address.clone(),
            });
        };

        let reply = async {
            wire::write_frame(stream, &body).await?;
            wire::read_frame(stream).await
        }
        .await;

        let frame = match reply {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stream = None;
                return Err(self.connection_error("connection closed before ack"));
            }
            Err(e) => {
                self.stream = None;
                return Err(self.connection_error(e));
            }
        };

        let ack = wire::decode_ack(&frame)
            .map_err(|e| ContractError::session_send(&self.address, e.to_string()))?;
        Ok(Ack {
            partition: Some(ack.partition),
            offset: Some(ack.offset),
        })
    }

    #[instrument(name = "tcp_session_close", skip(self), fields(destination = %self.address))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .shutdown()
                .await
                .map_err(|e| self.connection_error(e))?;
        }
        debug!(destination = %self.address, "TcpSession closed");
        Ok(())
    }
}
