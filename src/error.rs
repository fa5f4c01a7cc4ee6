//! Error types shared by the transport, protocol and supervisor layers
//!
//! None of these escape as a crash: the supervisor folds them into
//! connection status, the dispatcher into command outcomes.

use thiserror::Error;

/// Failures opening or using a connection to the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nothing is listening at the endpoint (or it refused us)
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The remote rejected our credentials
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The remote speaks a protocol version we do not support
    #[error("protocol version mismatch: {0}")]
    ProtocolVersionMismatch(String),

    /// The connection was closed (by either side)
    #[error("connection closed: {0}")]
    Closed(String),

    /// The remote broke the message contract
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// I/O failure on an established connection
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

/// Failures decoding a frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected message: expected {expected}, got op {op}")]
    Unexpected { expected: &'static str, op: u8 },
}
