//! # Shared Wire - Broker/Worker Contract
//!
//! Everything both ends of the tunnel must agree on.
//!
//! ## Frame Protocol
//!
//! ```text
//! ┌──────────────┐   binary frame: HTTP/1.1 request    ┌──────────────┐
//! │    Broker    │ ──────────────────────────────────→ │    Worker    │
//! │              │   binary frame: HTTP/1.1 response   │              │
//! │              │ ←────────────────────────────────── │              │
//! └──────────────┘                                     └──────────────┘
//!            both messages carry the `inlets-id` correlation header
//! ```
//!
//! - [`correlation`]: the per-request token and its header
//! - [`codec`]: HTTP message ⇄ frame bytes
//! - [`transport`]: frame sink/source ports plus an in-memory duplex pair

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod codec;
pub mod correlation;
pub mod error;
pub mod transport;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use correlation::{CorrelationId, CORRELATION_HEADER};
pub use error::{TransportError, WireError};
pub use transport::{memory_pair, FrameSink, FrameSource, MemorySink, MemorySource, MemoryTransport};

/// Maximum number of header fields accepted in a single frame.
pub const MAX_HEADERS: usize = 128;
