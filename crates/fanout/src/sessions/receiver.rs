//! TcpReceiver - accepting side of the TCP wire format
//!
//! Assigns offsets per (topic, partition), forwards every record to a channel
//! and acknowledges it. Used by the `listen` command and by tests.

use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::wire::{self, WireAck};

/// One record accepted by the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRecord {
    pub peer: SocketAddr,
    pub topic: String,
    pub partition: i32,
    pub offset: u64,
    pub payload: Bytes,
}

type OffsetTable = Arc<Mutex<HashMap<(String, i32), u64>>>;

pub struct TcpReceiver {
    listener: TcpListener,
    offsets: OffsetTable,
}

impl TcpReceiver {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            offsets: OffsetTable::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the record channel is closed
    #[instrument(name = "tcp_receiver_run", skip_all)]
    pub async fn run(self, records: mpsc::Sender<ReceivedRecord>) -> io::Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "Receiver listening");
        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = records.closed() => break,
            };
            debug!(%peer, "Connection accepted");

            let records = records.clone();
            let offsets = Arc::clone(&self.offsets);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, offsets, records).await {
                    warn!(%peer, error = %e, "Connection dropped");
                }
            });
        }
        Ok(())
    }
}

fn next_offset(offsets: &OffsetTable, topic: &str, partition: i32) -> u64 {
    let mut table = offsets.lock().unwrap_or_else(PoisonError::into_inner);
    let slot = table.entry((topic.to_string(), partition)).or_insert(0);
    let offset = *slot;
    *slot += 1;
    offset
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    offsets: OffsetTable,
    records: mpsc::Sender<ReceivedRecord>,
) -> io::Result<()> {
    while let Some(frame) = wire::read_frame(&mut stream).await? {
        let record = wire::decode_record(&frame)?;
        let partition = record.partition.unwrap_or(0);
        let offset = next_offset(&offsets, &record.topic, partition);

        let received = ReceivedRecord {
            peer,
            topic: record.topic,
            partition,
            offset,
            payload: Bytes::from(record.payload),
        };
        if records.send(received).await.is_err() {
            debug!(%peer, "Record channel closed, dropping connection");
            return Ok(());
        }

        let ack = wire::encode_ack(&WireAck { partition, offset })?;
        wire::write_frame(&mut stream, &ack).await?;
    }
    debug!(%peer, "Connection closed by peer");
    Ok(())
}
