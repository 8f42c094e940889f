//! Liveness endpoint.
//!
//! `GET /health` reports that the process is serving. It never contacts the
//! upstream: an unreachable upstream surfaces as 500s on `/api/`, not as an
//! unhealthy proxy.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "upstream": "https://jsonplaceholder.typicode.com",
///   "uptime_seconds": 42,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upstream: state.config.upstream_base_url.clone(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
