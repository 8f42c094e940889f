//! Request pipeline: resolve path → check method → forward → relay.
//!
//! ```text
//! Start ─┬─ Rejected ───────────────────────────▶ 400 / 404
//!        └─ PathResolved ─┬─ MethodRejected ────▶ 405 + Allow
//!                         └─ MethodChecked ─┬─ UpstreamFailed ─▶ 500
//!                                           └─ Forwarded ──────▶ upstream status
//!                                                 └─ RelayFailed (logged, connection aborted)
//! ```
//!
//! Upstream statuses are relayed verbatim by default, error statuses
//! included. The strict policy restores the older behaviour of answering
//! 502 for anything other than 200, 201 and 204.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use tracing::{debug, error};

use crate::config::UpstreamStatusPolicy;
use crate::error::{ProxyError, ProxyResult};
use crate::metrics;
use crate::middleware::RequestContext;

use super::policy::allowed_methods;
use super::resolver::{TargetResolution, resolve};
use super::upstream::{ProxyRequest, ProxyResponse, UpstreamClient};

/// Proxies `/api/posts[/{id}]` to a single upstream.
///
/// Cheap to clone; the upstream client and its pool are shared.
#[derive(Clone)]
pub struct ProxyHandler {
    base_url: Arc<str>,
    upstream: Arc<dyn UpstreamClient>,
    status_policy: UpstreamStatusPolicy,
}

impl ProxyHandler {
    /// `base_url` must not end with `/`.
    pub fn new(base_url: impl Into<String>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            base_url: Arc::from(base_url.into()),
            upstream,
            status_policy: UpstreamStatusPolicy::default(),
        }
    }

    pub fn with_status_policy(mut self, status_policy: UpstreamStatusPolicy) -> Self {
        self.status_policy = status_policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn status_policy(&self) -> UpstreamStatusPolicy {
        self.status_policy
    }

    /// Run one inbound request through the pipeline.
    ///
    /// Never fails: every outcome, including upstream failure, becomes a
    /// response for the caller.
    pub async fn handle(&self, ctx: &RequestContext, req: Request) -> Response {
        match self.proxy(ctx, req).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_rejection(e.reason());
                e.into_response()
            }
        }
    }

    async fn proxy(&self, ctx: &RequestContext, req: Request) -> ProxyResult<Response> {
        let (parts, body) = req.into_parts();
        let method = parts.method;
        let path = parts.uri.path();

        let (url, shape) = match resolve(&self.base_url, path) {
            TargetResolution::Resolved { url, shape } => (url, shape),
            TargetResolution::Rejected(rejection) => {
                let e = ProxyError::from(rejection);
                error!(method = %method, path, reason = e.reason(), "{e}");
                return Err(e);
            }
        };

        let allowed = allowed_methods(shape);
        if !allowed.contains(&method) {
            error!(
                method = %method,
                path,
                allow = %allowed.allow_header(),
                "Method not allowed"
            );
            return Err(ProxyError::MethodNotAllowed { allowed });
        }

        debug!(method = %method, path, target = %url, "Forwarding request");

        let request = ProxyRequest {
            method: method.clone(),
            url: url.clone(),
            headers: parts.headers,
            body,
        };

        let upstream = match self.upstream.forward(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    method = %method,
                    path,
                    url = %url,
                    kind = e.kind(),
                    error = %e,
                    "Upstream error"
                );
                metrics::record_upstream_error(e.kind());
                return Err(e.into());
            }
        };

        if self.status_policy == UpstreamStatusPolicy::Strict
            && !is_strict_success(upstream.status)
        {
            error!(
                method = %method,
                path,
                url = %url,
                status = upstream.status.as_u16(),
                "Upstream error"
            );
            return Err(ProxyError::UpstreamStatus(upstream.status));
        }

        debug!(
            url = %url,
            status = %upstream.status_text(),
            "Relaying upstream response"
        );

        Ok(relay(ctx, upstream))
    }
}

/// Statuses the strict policy lets through.
fn is_strict_success(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT
    )
}

/// Turn the upstream response into the caller's response, headers first.
///
/// The body is streamed. It is polled after the handler has returned, so a
/// failure mid-body is logged under the request's own span. By then the
/// status line is out and the connection can only be aborted.
fn relay(ctx: &RequestContext, upstream: ProxyResponse) -> Response {
    let span = ctx.span().clone();
    let body = upstream.body.into_data_stream().inspect_err(move |e| {
        span.in_scope(|| error!(error = %e, "Failed to proxy response"));
        metrics::record_relay_failure();
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    response
}
