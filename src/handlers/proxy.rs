//! Entry point for everything under `/api/`.

use axum::extract::{Request, State};
use axum::response::Response;

use crate::middleware::RequestContextExt;
use crate::state::AppState;

/// Proxy handler mounted on `/api/` and `/api/{*path}` for every method.
///
/// The request logger normally supplies the [`RequestContext`](crate::middleware::RequestContext). Without it
/// (a router assembled without the layer) a fresh context is used so the
/// request is still correlated in the logs.
pub async fn proxy(State(state): State<AppState>, req: Request) -> Response {
    let ctx = req.request_context().cloned().unwrap_or_default();
    state.proxy.handle(&ctx, req).await
}
