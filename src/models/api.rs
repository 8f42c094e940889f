use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests
    pub status: String,
    /// Crate version
    pub version: String,
    /// Upstream root requests are forwarded to
    pub upstream: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Response timestamp
    pub timestamp: DateTime<Utc>,
}
