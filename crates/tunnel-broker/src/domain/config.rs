//! Broker configuration with validation.
//!
//! Loaded from an optional TOML file, then overridden from the environment.
//!
//! ```toml
//! [http]
//! host = "0.0.0.0"
//! port = 9000
//!
//! [tunnel]
//! path = "/ws"
//! outbound_queue = 256
//! max_frame_size = 16777216
//!
//! [ingress]
//! timeout = "4s"
//! max_body_size = 8388608
//!
//! [admin]
//! host = "127.0.0.1"
//! port = 9001
//! enabled = true
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Main broker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Public HTTP listener (inbound callers and the tunnel upgrade)
    pub http: HttpConfig,
    /// Tunnel endpoint configuration
    pub tunnel: TunnelConfig,
    /// Inbound request handling
    pub ingress: IngressConfig,
    /// Admin server configuration (localhost only by default)
    pub admin: AdminConfig,
}

impl BrokerConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string. Missing sections keep their defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from the environment.
    ///
    /// - `INLETS_PORT`: public HTTP port
    /// - `INLETS_TIMEOUT_MS`: ingress wait in milliseconds
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("INLETS_PORT") {
            match port.parse() {
                Ok(p) => {
                    self.http.port = p;
                    info!(port = p, "Loaded HTTP port from environment");
                }
                Err(_) => warn!(value = %port, "INLETS_PORT is not a valid port"),
            }
        }
        if let Ok(ms) = std::env::var("INLETS_TIMEOUT_MS") {
            match ms.parse() {
                Ok(ms) => self.ingress.timeout = Duration::from_millis(ms),
                Err(_) => warn!(value = %ms, "INLETS_TIMEOUT_MS is not a number"),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tunnel.path.starts_with('/') || self.tunnel.path == "/" {
            return Err(ConfigError::InvalidPath(self.tunnel.path.clone()));
        }

        if self.tunnel.outbound_queue == 0 {
            return Err(ConfigError::InvalidLimit(
                "outbound_queue cannot be 0".into(),
            ));
        }

        if self.tunnel.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_frame_size cannot be 0".into(),
            ));
        }

        if self.ingress.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "ingress timeout cannot be 0".into(),
            ));
        }

        if self.admin.enabled && self.admin.port == self.http.port && self.http.port != 0 {
            return Err(ConfigError::DuplicatePorts);
        }

        Ok(())
    }

    /// Get public HTTP bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Get Admin server bind address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.admin.host, self.admin.port)
    }
}

/// Public HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 9000)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9000,
        }
    }
}

/// Tunnel endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Path the worker upgrades on
    pub path: String,
    /// Requests buffered for the send loop
    pub outbound_queue: usize,
    /// Largest frame accepted from the worker, in bytes
    pub max_frame_size: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            outbound_queue: 256,
            max_frame_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Inbound request handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// How long a caller waits for the worker's response
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Max inbound body size in bytes
    pub max_body_size: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(4),
            max_body_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// Admin server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address (localhost only by default)
    pub host: IpAddr,
    /// Port (default: 9001)
    pub port: u16,
    /// Enable admin server
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9001,
            enabled: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {error}")]
    Io { path: String, error: String },
    /// Config file is not valid TOML for this schema
    #[error("parse error: {0}")]
    Parse(String),
    /// Tunnel path must be absolute and not the root
    #[error("invalid tunnel path: {0:?}")]
    InvalidPath(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Public and admin servers on the same port
    #[error("duplicate ports configured")]
    DuplicatePorts,
}

/// Duration as "4s" / "500ms" / "2m" strings.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
