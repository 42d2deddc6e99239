//! Correlation token for request/response matching.
//!
//! Uses UUID v4 rendered as 32 hex characters, the form the worker echoes back.

use http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Header carrying the correlation token on both the request and its response.
pub const CORRELATION_HEADER: &str = "inlets-id";

/// Correlation ID tying a forwarded request to the response the worker sends back.
///
/// Random (v4), so two in-flight requests never share a token in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation ID (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string. Accepts simple, hyphenated, braced and URN forms.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s.trim()).map(Self)
    }

    /// Read the token from the `inlets-id` header, if present and well formed.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(CORRELATION_HEADER)?.to_str().ok()?;
        Self::parse(value).ok()
    }

    /// Render as a header value.
    pub fn header_value(&self) -> HeaderValue {
        // 32 ASCII hex digits are always a valid header value
        HeaderValue::from_str(&self.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// Set the `inlets-id` header, replacing any value already present.
    pub fn inject(&self, headers: &mut HeaderMap) {
        headers.insert(CORRELATION_HEADER, self.header_value());
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<CorrelationId> for Uuid {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}
