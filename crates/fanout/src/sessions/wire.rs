//! TCP wire format
//!
//! Every frame is a big-endian `u32` length followed by a bincode body.
//! Producers send a [`WireRecord`]; the receiver answers each record with
//! exactly one [`WireAck`] on the same connection, in order.

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame body either side will accept
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Record as read by the receiver
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireRecord {
    pub topic: String,
    pub partition: Option<i32>,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Serialize)]
struct WireRecordRef<'a> {
    topic: &'a str,
    partition: Option<i32>,
    #[serde(with = "serde_bytes")]
    payload: &'a [u8],
}

/// Receiver acknowledgement for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAck {
    pub partition: i32,
    pub offset: u64,
}

fn invalid_data(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

pub fn encode_record(topic: &str, partition: Option<i32>, payload: &[u8]) -> io::Result<Vec<u8>> {
    bincode::serialize(&WireRecordRef {
        topic,
        partition,
        payload,
    })
    .map_err(invalid_data)
}

pub fn decode_record(body: &[u8]) -> io::Result<WireRecord> {
    bincode::deserialize(body).map_err(invalid_data)
}

pub fn encode_ack(ack: &WireAck) -> io::Result<Vec<u8>> {
    bincode::serialize(ack).map_err(invalid_data)
}

pub fn decode_ack(body: &[u8]) -> io::Result<WireAck> {
    bincode::deserialize(body).map_err(invalid_data)
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(invalid_data(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            body.len()
        )));
    }
    // Bounded by MAX_FRAME_LEN above
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

/// Read one length-prefixed frame
///
/// Returns `Ok(None)` when the peer closed the connection between frames.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(invalid_data(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
