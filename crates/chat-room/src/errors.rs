//! Chat room error types.
//!
//! Every failure is local to one client or one operation; none of these
//! errors ever halts the room loop. Decode failures are logged and the
//! offending frame is dropped without a reply to the sender.

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::MessageKind;

/// Chat room error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed envelope header or variant payload.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Non-moderator attempted a moderation operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid role transition (mute-already-muted, unmute-not-muted).
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// The named identity is not currently a member.
    #[error("not found: {0}")]
    NotFound(String),

    /// Read or write failure on a connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A client's bounded outbound queue is full; the client is evicted.
    #[error("outbound queue at capacity for client {0}")]
    CapacityExceeded(Uuid),

    /// Bearer credential rejected before admission.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A room mailbox send or response failed (room is gone).
    #[error("mailbox error: {0}")]
    Mailbox(String),
}

/// Envelope decode errors.
///
/// Decoding is two-phase: the header (type tag) first, then the
/// variant payload for the discovered tag.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The envelope header could not be parsed at all.
    #[error("malformed envelope header: {0}")]
    Header(String),

    /// The type tag names no known message variant.
    #[error("unknown message type: {0}")]
    UnknownKind(String),

    /// The header parsed but the variant payload did not.
    #[error("malformed {kind} payload: {detail}")]
    Payload { kind: MessageKind, detail: String },
}

/// Read/write failure on a transport connection.
#[derive(Debug, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        TransportError(err.to_string())
    }
}
