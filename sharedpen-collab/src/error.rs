//! Error types for the wire protocol and the collaboration session.

use sharedpen_core::OtError;
use thiserror::Error;

use crate::protocol::ClientId;

/// Wire-level failures: a frame that could not be encoded or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The frame names an event this side does not handle.
    #[error("invalid message type")]
    InvalidMessageType,
}

/// Everything a client or server session can reject.
///
/// None of these leave shared state half-updated: a rejected operation is
/// dropped and the document stays as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollabError {
    #[error("operation revision {revision} not in history of length {history}")]
    RevisionOutOfRange { revision: i64, history: usize },

    #[error("client {0} has no write permission")]
    UnauthorizedWrite(ClientId),

    /// An ack arrived while nothing was in flight.
    #[error("there is no pending operation")]
    NoPendingOperation,

    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    #[error("room is full ({capacity} peers)")]
    RoomFull { capacity: usize },

    /// The connection fell behind the room and frames were lost. It has to
    /// rejoin to get a consistent document.
    #[error("connection lagged behind its room, {skipped} frames lost")]
    ConnectionLagged { skipped: u64 },

    #[error(transparent)]
    Ot(#[from] OtError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, CollabError>;
