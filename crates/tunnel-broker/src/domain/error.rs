//! Broker error types.
//!
//! None of these reach an inbound caller directly: tunnel-side failures are
//! reported to callers only as a gateway timeout.

use crate::domain::config::ConfigError;
use std::net::SocketAddr;

/// Service-level errors (startup and serving).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server socket bind error
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Accept loop failed
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Why a request could not be handed to the tunnel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    /// No worker is connected.
    #[error("no tunnel session is active")]
    NoSession,

    /// The session ended while the request was being queued.
    #[error("tunnel session closed")]
    SessionClosed,

    /// The outbound queue stayed full for the whole wait window.
    #[error("outbound queue full")]
    QueueFull,
}

/// Tunnel session ownership errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A worker is already connected; only one session at a time.
    #[error("tunnel session {session_id} is already active")]
    AlreadyActive { session_id: u64 },
}
