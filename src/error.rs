use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::proxy::policy::MethodSet;

/// Failure of a single outbound call to the upstream service.
///
/// Every variant is surfaced to the caller as a bare `500 Server Error`;
/// the detail only ever reaches the logs.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("upstream request could not be built: {0}")]
    Build(String),

    #[error("upstream timed out: {0}")]
    Timeout(String),

    #[error("upstream connection failed: {0}")]
    Connect(String),

    #[error("upstream request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Build(_) => "build",
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::Request(_) => "request",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::Build(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Every way a proxied request can end without relaying the upstream response.
///
/// # Client input
///
/// `EmptyPath`, `InvalidEndpoint`, `InvalidItemId`, `PathTooLong` and
/// `MethodNotAllowed` are caller mistakes and map to 4xx. They are never retried.
///
/// # Upstream
///
/// `Upstream` wraps a transport failure (500). `UpstreamStatus` only occurs
/// under the strict status policy (502).
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Empty path after /api/")]
    EmptyPath,

    #[error("Invalid endpoint")]
    InvalidEndpoint,

    #[error("Invalid post ID")]
    InvalidItemId,

    #[error("Invalid path")]
    PathTooLong,

    #[error("Method not allowed")]
    MethodNotAllowed { allowed: MethodSet },

    #[error("Server Error")]
    Upstream(#[from] TransportError),

    #[error("Upstream error: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// HTTP status the caller sees for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::EmptyPath | ProxyError::InvalidItemId => StatusCode::BAD_REQUEST,
            ProxyError::InvalidEndpoint | ProxyError::PathTooLong => StatusCode::NOT_FOUND,
            ProxyError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Upstream(_) | ProxyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::EmptyPath => "empty_path",
            ProxyError::InvalidEndpoint => "invalid_endpoint",
            ProxyError::InvalidItemId => "invalid_item_id",
            ProxyError::PathTooLong => "path_too_long",
            ProxyError::MethodNotAllowed { .. } => "method_not_allowed",
            ProxyError::Upstream(_) => "upstream_transport",
            ProxyError::UpstreamStatus(_) => "upstream_status",
            ProxyError::Config(_) => "config",
        }
    }

    /// Caller-facing message, without the trailing newline.
    ///
    /// Transport and configuration details never leave the process.
    fn public_message(&self) -> String {
        match self {
            ProxyError::Upstream(_) | ProxyError::Config(_) => "Server Error".to_string(),
            ProxyError::UpstreamStatus(status) => format!(
                "Upstream error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = plain_text(self.status(), &self.public_message());

        if let ProxyError::MethodNotAllowed { allowed } = &self
            && let Ok(value) = HeaderValue::from_str(&allowed.allow_header())
        {
            response.headers_mut().insert(header::ALLOW, value);
        }

        response
    }
}

/// Build a plain-text error response in the conventional shape: message
/// followed by a newline, `text/plain` content type and `nosniff`.
pub fn plain_text(status: StatusCode, message: &str) -> Response {
    let mut response = (status, format!("{message}\n")).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Convenience type alias for Results with ProxyError.
pub type ProxyResult<T> = Result<T, ProxyError>;
