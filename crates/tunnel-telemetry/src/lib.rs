//! # Tunnel Telemetry
//!
//! Structured logging for the broker and the worker.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tunnel_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env("tunnel-broker");
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `INLETS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `INLETS_JSON_LOGS` | `true` in containers | JSON formatted output |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install global subscriber: {0}")]
    Install(String),
}
