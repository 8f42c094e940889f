//! # Posts Proxy
//!
//! A minimal reverse proxy that forwards `/api/posts` and `/api/posts/{id}`
//! to a single upstream REST service, after validating the path shape and
//! the HTTP method.
//!
//! - **Validation**: path shape and per-shape method allow-list, answered
//!   locally with plain-text 4xx responses
//! - **Streaming**: request and response bodies pass through unbuffered
//! - **Observability**: per-request correlation ids, structured logs,
//!   Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request Logger → Timeout)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, proxy)                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ProxyHandler (resolve → method policy → forward → relay)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UpstreamClient (HttpUpstream / ScriptedUpstream)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Upstream posts service                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use posts_proxy::{AppState, Config, HttpUpstream, ProxyServer, build_router, server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let upstream = HttpUpstream::from_config(&config)?;
//!
//!     let state = AppState::new(Arc::new(upstream), config.clone());
//!     let server = ProxyServer::bind(&config, build_router(state)).await?;
//!     server
//!         .run_until(server::shutdown_signal(), config.shutdown_grace)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Upstream Configuration
//!
//! ```bash
//! UPSTREAM_BASE_URL=http://localhost:3000 UPSTREAM_TIMEOUT_SECS=5 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod state;

// Re-exports for convenience
pub use config::Config;
pub use error::{ProxyError, ProxyResult, TransportError};
pub use proxy::{HttpUpstream, ProxyHandler, ScriptedUpstream, UpstreamClient};
pub use routes::build_router;
pub use server::{ConnectionLimits, ProxyServer, ShutdownOutcome};
pub use state::AppState;
