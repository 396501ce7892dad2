//! Error types for reflectrpc.

use thiserror::Error;

use crate::protocol::Value;

/// Main error type for all reflectrpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while exchanging a protocol definition.
    #[error("protocol definition error: {0}")]
    Json(#[from] serde_json::Error),

    /// Peer closed the connection in the middle of a frame.
    #[error("connection closed mid-frame")]
    ConnectionClosed,

    /// Handshake failed twice; the connection cannot be used.
    #[error("protocol mismatch: handshake failed after retry")]
    ProtocolMismatch,

    /// Message name absent from the protocol in force.
    #[error("unknown message: {0}")]
    UnknownMessage(String),

    /// Caller supplied the wrong number of arguments for a message.
    #[error("message {message} takes {expected} argument(s), got {actual}")]
    ArgumentCountMismatch {
        message: String,
        expected: usize,
        actual: usize,
    },

    /// A well-framed request could not be decoded.
    #[error("malformed call: {0}")]
    MalformedCall(String),

    /// A well-framed response could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Value does not fit the schema type it was encoded or decoded against.
    #[error("codec error: {0}")]
    Codec(String),

    /// Frame segment exceeds the configured maximum.
    #[error("frame segment of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Responder was built without a handler for a protocol message.
    #[error("no handler registered for message: {0}")]
    HandlerMissing(String),

    /// Failure reported by the remote handler in a response frame.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// An application-level failure carried in a response frame.
///
/// Declared errors round-trip with their original type and fields; anything
/// else crosses the wire as an opaque text description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// Typed error from the message's declared error set.
    #[error("declared error: {0}")]
    Declared(Value),

    /// Undeclared failure, degraded to its description.
    #[error("{0}")]
    Undeclared(String),
}

impl RemoteError {
    /// Text form used when an error has to cross the wire untyped.
    pub fn description(&self) -> String {
        match self {
            RemoteError::Declared(value) => value.to_string(),
            RemoteError::Undeclared(text) => text.clone(),
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
