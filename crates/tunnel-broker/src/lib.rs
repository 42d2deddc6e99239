//! Tunnel Broker - public side of the reverse tunnel.
//!
//! Inbound HTTP callers are multiplexed over the single WebSocket the worker
//! keeps open, and each response is routed back to the caller that is waiting
//! for it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              TUNNEL BROKER                                   │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐                        ┌──────────────────┐           │
//! │  │  Inbound HTTP    │                        │   Admin (local)  │           │
//! │  │  any method/path │                        │ /health /pending │           │
//! │  └────────┬─────────┘                        └──────────────────┘           │
//! │           │ mint token, subscribe                                           │
//! │  ┌────────┴─────────┐   deliver(token)   ┌──────────────────────┐           │
//! │  │     Ingress      │ ◄───────────────── │ Correlation Registry │           │
//! │  │ (wait ≤ timeout) │ ─── subscribe ───► │  token → slot (RW)   │           │
//! │  └────────┬─────────┘                    └──────────▲───────────┘           │
//! │           │ submit                                  │ dispatch              │
//! │  ┌────────┴─────────────────────────────────────────┴───────────┐           │
//! │  │ Tunnel Session:  send loop (FIFO)  │  receive loop (decode)   │           │
//! │  └──────────────────────────────┬─────────────────────────────────┘          │
//! └─────────────────────────────────┼───────────────────────────────────────────┘
//!                                   │ WebSocket /ws (binary HTTP frames)
//!                                   ▼
//!                                 Worker
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tunnel_broker::{BrokerConfig, BrokerService};
//!
//! let service = BrokerService::new(BrokerConfig::default())?;
//! service.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ingress;
pub mod middleware;
pub mod registry;
pub mod service;
pub mod tunnel;

// Re-exports for public API
pub use domain::config::BrokerConfig;
pub use domain::error::{BrokerError, HandoffError, SessionError};
pub use ingress::{Ingress, IngressOutcome};
pub use registry::{
    CorrelationRegistry, DeliveryOutcome, DeliverySlot, RegistryStats, RegistryStatsSnapshot,
};
pub use service::BrokerService;
pub use tunnel::{SessionEnd, TunnelHub, TunnelSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
