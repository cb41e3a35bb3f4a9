//! Process-group wire protocol
//!
//! Messages exchanged between the coordinator (rank 0) and the member ranks of
//! a [`TcpGroup`](super::TcpGroup). The protocol uses MessagePack (rmp-serde)
//! for compact binary serialization with full serde feature support.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Member rank r                   Coordinator (rank 0)
//!     |                              |
//!     |-------- JOIN(r, size) ------>|
//!     |                              |  (waits for every rank)
//!     |<------- WELCOME -------------|
//!     |                              |
//!     |-- CONTRIBUTE(seq, payload) ->|
//!     |                              |  (combines in rank order)
//!     |<-- COMBINED(seq, payload) ---|
//!     |            ...               |
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// Coordinator and members must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted message body
pub const MAX_MESSAGE_BYTES: usize = 100 * 1024 * 1024;

/// Data carried by one collective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// One rank's value, or the reduced total
    Value(f64),
    /// One rank's record-name manifest
    Names(Vec<String>),
    /// Every rank's manifest, indexed by rank
    Gathered(Vec<Vec<String>>),
}

/// Protocol message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Join request (Member → Coordinator)
    ///
    /// First message on every member connection.
    Join(JoinMessage),

    /// Join acknowledgment (Coordinator → Member)
    ///
    /// Sent once every rank has joined; collectives may start afterwards.
    Welcome(WelcomeMessage),

    /// Contribution to a collective (Member → Coordinator)
    Contribute(ContributeMessage),

    /// Combined result of a collective (Coordinator → Member)
    Combined(CombinedMessage),

    /// Error message (either direction)
    ///
    /// The receiver reports the error and leaves the group.
    Error(ErrorMessage),
}

/// Join message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Rank claimed by the member
    pub rank: usize,

    /// Group size the member was started with
    pub size: usize,

    /// Host name of the member
    pub node_id: String,
}

/// Welcome message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    /// Protocol version
    pub protocol_version: u32,

    /// Confirmed group size
    pub size: usize,
}

/// Contribute message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributeMessage {
    /// Collective sequence number, starting at 0
    pub seq: u64,

    /// This rank's contribution
    pub payload: Payload,
}

/// Combined message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedMessage {
    /// Collective sequence number
    pub seq: u64,

    /// Combined result
    pub payload: Payload,
}

/// Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Rank of the sender
    pub rank: usize,

    /// Error description
    pub error: String,
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg)
        .context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_bytes.len());
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Expects a 4-byte length prefix followed by a MessagePack-serialized message.
///
/// # Returns
///
/// Returns (message, bytes_consumed) where bytes_consumed includes the length prefix.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < 4 {
        anyhow::bail!("Buffer too small for message length (need 4 bytes, got {})", buf.len());
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if buf.len() < 4 + msg_len {
        anyhow::bail!("Incomplete message (need {} bytes, got {})", 4 + msg_len, buf.len());
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len])
        .context("Failed to deserialize message")?;

    Ok((msg, 4 + msg_len))
}

/// Read a complete message from a stream
///
/// Reads the length prefix, then the message body.
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    if msg_len > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_len);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream.read_exact(&mut msg_buf).await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf)
        .context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a stream
///
/// Serializes the message with length prefix, writes and flushes.
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, msg: &Message) -> Result<()> {
    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await
        .context("Failed to write message")?;

    stream.flush().await
        .context("Failed to flush stream")?;

    Ok(())
}
