// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for client connections.
//!
//! Frames are a 4-byte big-endian length prefix followed by a JSON body.
//! Connections are long-lived: clients send `Request`s and the daemon pushes
//! `ServerMessage`s, which carry either a reply to a request or an unsolicited
//! resource state update for a subscribed resource.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use turnstile_core::{ClientId, Snapshot};

/// Protocol version, echoed back to `Hello`
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum frame size (1 MiB)
pub const MAX_FRAME: usize = 1024 * 1024;

/// Default timeout for writes and client-side reads
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests a client can send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Version handshake
    Hello { version: String },

    /// Liveness check
    Ping,

    /// Register a new resource
    CreateResource {
        name: String,
        description: Option<String>,
        timeout_seconds: u64,
    },

    /// Subscribe to state updates for a resource
    JoinResource { resource_id: String },

    /// Join the waitlist, optionally resuming a previously issued identity
    JoinQueue {
        resource_id: String,
        display_name: String,
        identity: Option<ClientId>,
    },

    /// Give up exclusive access (holder only)
    ReleaseResource {
        resource_id: String,
        identity: ClientId,
    },

    /// Accept the outstanding offer
    AcceptOffer {
        resource_id: String,
        identity: ClientId,
    },

    /// Decline the outstanding offer and leave the waitlist
    RejectOffer {
        resource_id: String,
        identity: ClientId,
    },

    /// Leave the waitlist from any position
    LeaveQueue {
        resource_id: String,
        identity: ClientId,
    },

    /// Daemon status
    Status,

    /// Request graceful shutdown
    Shutdown,
}

/// Replies to requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Action applied (or resolved as a silent no-op)
    Ok,

    Pong,

    Hello { version: String },

    ResourceCreated { resource_id: String },

    /// Subscription confirmed; carries the current state
    Subscribed { state: Snapshot },

    /// Waitlist joined; `identity` is the caller's credential for this resource
    Joined {
        resource_id: String,
        identity: ClientId,
    },

    /// Action not applied; `kind` is a stable machine-readable name
    Rejected { kind: String, message: String },

    Status {
        uptime_secs: u64,
        resources: usize,
        subscribers: usize,
    },

    ShuttingDown,
}

/// Everything the daemon pushes down a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Direct reply to the caller's most recent request
    Reply { response: Response },

    /// Post-transition state of a subscribed resource
    StateUpdate { state: Snapshot },
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Frame too large: {0} bytes (max {MAX_FRAME})")]
    FrameTooLarge(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Operation timed out")]
    Timeout,
}

/// Encode a message as raw JSON (no length prefix)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode a message from raw JSON
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed frame
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one length-prefixed frame
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), ProtocolError> {
    if body.len() > MAX_FRAME {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next request; waits indefinitely (connections are long-lived)
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Request, ProtocolError> {
    let body = read_message(reader).await?;
    decode(&body)
}

/// Write a server message with a timeout
pub async fn write_server_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &ServerMessage,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let body = encode(message)?;
    tokio::time::timeout(timeout, write_message(writer, &body))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Client-side: read the next server message with a timeout
pub async fn read_server_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<ServerMessage, ProtocolError> {
    let body = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&body)
}

/// Client-side: write a request with a timeout
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &Request,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let body = encode(request)?;
    tokio::time::timeout(timeout, write_message(writer, &body))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
