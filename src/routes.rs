//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │  Request Logger  │ ← correlation id, started/completed lines, metrics
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Timeout      │ ← 408 if no response head within REQUEST_TIMEOUT_SECS
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Liveness
//! - `/api/`, `/api/{*path}` - Proxied to the upstream, any method

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{any, get};
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::RequestLoggerLayer;
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// Method filtering for `/api/` happens in the proxy pipeline rather than in
/// the router, so disallowed methods get the proxy's own 405 with its `Allow`
/// header.
pub fn build_router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout;

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/", any(handlers::proxy))
        .route("/api/{*path}", any(handlers::proxy));

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Bodies are streamed through, never buffered, so no size cap
    router = router.layer(DefaultBodyLimit::disable());

    // 2. Inbound timeout
    info!(timeout = ?request_timeout, "Inbound request timeout configured");
    router = router.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        request_timeout,
    ));

    // 3. Request logger (outermost)
    router = router.layer(RequestLoggerLayer::new());

    router.with_state(state)
}
