//! Error types for jsonrpc-mux.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for all connection operations.
///
/// The first failure a connection observes latches as its sticky error:
/// every later request or notification on that connection fails fast with a
/// clone of it, without touching the stream. Source errors are held behind
/// `Arc` so the latched value can be handed out repeatedly.
#[derive(Debug, Clone, Error)]
pub enum MuxError {
    /// Writing an envelope to the stream failed.
    #[error("stream write failed: {0}")]
    Write(#[source] Arc<std::io::Error>),

    /// Reading from the stream failed.
    #[error("stream read failed: {0}")]
    Read(#[source] Arc<std::io::Error>),

    /// An incoming record could not be decoded as a response envelope.
    #[error("envelope decode failed: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// An outgoing envelope could not be serialized.
    #[error("envelope encode failed: {0}")]
    Encode(#[source] Arc<serde_json::Error>),

    /// The stream reached end-of-file or the connection was torn down.
    #[error("connection closed")]
    Closed,
}

/// Result type alias using MuxError.
pub type Result<T> = std::result::Result<T, MuxError>;
