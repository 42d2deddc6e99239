//! Wire and transport error types.

use thiserror::Error;

/// Errors turning frame bytes into HTTP messages (or back).
#[derive(Debug, Error)]
pub enum WireError {
    /// The head of the message is not valid HTTP/1.x.
    #[error("malformed HTTP message: {0}")]
    Parse(#[from] httparse::Error),

    /// The frame ended before the header section did.
    #[error("incomplete HTTP header section")]
    Incomplete,

    /// More header fields than [`crate::MAX_HEADERS`].
    #[error("too many header fields")]
    TooManyHeaders,

    /// Content-Length promised more bytes than the frame holds.
    #[error("body truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Declared body length.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Content-Length is not a non-negative integer.
    #[error("invalid content-length header")]
    InvalidContentLength,

    /// A chunked body could not be decoded.
    #[error("invalid chunked body: {0}")]
    InvalidChunk(&'static str),

    /// The parsed parts do not form a valid `http` message.
    #[error("invalid HTTP message: {0}")]
    Http(#[from] http::Error),
}

/// Errors on the frame transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer or the local side closed the transport.
    #[error("transport closed")]
    Closed,

    /// Read or write failure on the underlying connection.
    #[error("transport I/O error: {0}")]
    Io(String),
}
