//! Error types for the relay core.

use thiserror::Error;

use super::registry::RoomId;

/// Errors surfaced by room registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The room identifier is unknown (never created, or already evicted).
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),
}

/// Failure to hand a payload to a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The outbound queue is full: the peer is not draining fast enough.
    #[error("outbound queue is full")]
    Backpressure,
    /// The writer task is gone (socket write failed or peer hung up).
    #[error("connection writer is gone")]
    Disconnected,
    /// The handle was closed locally.
    #[error("connection is closed")]
    Closed,
}

/// Transport-level failure while reading from a connection.
#[derive(Debug, Error)]
#[error("receive failed: {0}")]
pub struct ReceiveError(pub String);

/// An inbound frame that could not be turned into a payload.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("binary frames are not supported")]
    BinaryFrame,
}

impl EncodingError {
    /// Short machine-readable code sent back to the client.
    pub fn code(&self) -> &'static str {
        match self {
            EncodingError::InvalidJson(_) | EncodingError::NotAnObject(_) => "invalid_payload",
            EncodingError::BinaryFrame => "unsupported_frame",
        }
    }
}
