//! Configuration and error types for the broker.

pub mod config;
pub mod error;

// Re-exports for convenience
pub use config::{AdminConfig, BrokerConfig, ConfigError, HttpConfig, IngressConfig, TunnelConfig};
pub use error::{BrokerError, HandoffError, SessionError};
