//! Request logging middleware.
//!
//! # Per-request flow
//!
//! 1. Generate a UUIDv4 correlation id
//! 2. Open an `info` span carrying it and stash a [`RequestContext`] in the
//!    request extensions
//! 3. Log `Request started` (method, path)
//! 4. Run the inner service inside the span
//! 5. Log `Request completed` (method, path, status, duration) whether the
//!    inner service answered with a success, an error status, or an error
//!
//! The status reported is the one on the response head returned by the inner
//! service. A response head is produced exactly once, so this is the first
//! and only status written to the caller. Duration is measured up to that
//! point; streaming the body afterwards is not included.

use std::fmt;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, Span, error, info, info_span};
use uuid::Uuid;

use crate::metrics;

/// Correlation id plus the span every log line for the request is bound to.
///
/// Created once per inbound request by [`RequestLoggerService`] and handed
/// to the handler explicitly. Never shared between requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    span: Span,
}

impl RequestContext {
    /// Create a context with a fresh UUIDv4 correlation id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create a context around a known id.
    pub fn with_id(request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        let span = info_span!("request", request_id = %request_id);
        Self { request_id, span }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Span carrying `request_id`. Enter it to log on behalf of the request
    /// from code that runs outside the request future, such as body streams.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension trait to read the [`RequestContext`] from a request.
pub trait RequestContextExt {
    fn request_context(&self) -> Option<&RequestContext>;
}

impl<B> RequestContextExt for Request<B> {
    fn request_context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }
}

/// Request logger layer for the Tower middleware stack.
#[derive(Clone, Default)]
pub struct RequestLoggerLayer;

impl RequestLoggerLayer {
    /// Create a new request logger layer.
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggerService { inner }
    }
}

/// Request logger service wrapper.
#[derive(Clone)]
pub struct RequestLoggerService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestLoggerService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: fmt::Display,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let context = RequestContext::new();
        let span = context.span().clone();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        req.extensions_mut().insert(context);

        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                info!(method = %method, path = %path, "Request started");
                let start = Instant::now();

                let result = inner.call(req).await;

                let elapsed = start.elapsed();
                let status = match &result {
                    Ok(response) => response.status().as_u16(),
                    Err(e) => {
                        error!(method = %method, path = %path, error = %e, "Request handler failed");
                        500
                    }
                };

                info!(
                    method = %method,
                    path = %path,
                    status,
                    duration_ms = elapsed.as_secs_f64() * 1000.0,
                    "Request completed"
                );
                metrics::record_request(method.as_str(), status, elapsed.as_secs_f64());

                result
            }
            .instrument(span),
        )
    }
}
