//! # Tunnel Worker
//!
//! Dials the broker, then answers every request frame with a `200 OK` that
//! carries the same `inlets-id` token.
//!
//! ```rust,ignore
//! use tunnel_worker::{connect, WorkerRelay};
//!
//! let (sink, source) = connect("ws://127.0.0.1:9000/ws").await?;
//! WorkerRelay::new().run(sink, source).await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod relay;

pub use client::{connect, ConnectError, TungsteniteSink, TungsteniteSource};
pub use relay::{RelaySummary, WorkerRelay};
