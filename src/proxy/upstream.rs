//! Outbound calls to the upstream posts service.
//!
//! # Implementations
//!
//! - [`HttpUpstream`]: pooled `reqwest` client used in production
//! - [`ScriptedUpstream`]: in-memory double that replays scripted outcomes
//!   and records what it received, so handler tests never touch the network
//!
//! # Cancellation
//!
//! `forward` returns a future. Dropping it (the inbound connection went away,
//! or an outer timeout fired) aborts the in-flight upstream call; there is
//! no separate cancellation handle to thread through.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode, header};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{ProxyError, ProxyResult, TransportError};

/// What gets sent upstream: the inbound request minus everything the
/// upstream does not need to see.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    /// Fully resolved target, always `{base}/posts[/{id}]`.
    pub url: String,
    pub headers: HeaderMap,
    /// Streamed to the upstream, read at most once.
    pub body: Body,
}

/// What came back from the upstream, relayed to the caller as-is.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyResponse {
    /// Status line text, e.g. `404 Not Found`.
    pub fn status_text(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {reason}", self.status.as_u16()),
            None => self.status.as_u16().to_string(),
        }
    }
}

/// Boxed future returned by [`UpstreamClient::forward`].
pub type ForwardFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProxyResponse, TransportError>> + Send + 'a>>;

/// Capability to perform exactly one upstream call.
///
/// Implementations must not retry: one `forward` is one attempt.
pub trait UpstreamClient: Send + Sync {
    fn forward(&self, request: ProxyRequest) -> ForwardFuture<'_>;
}

// =============================================================================
// Network client
// =============================================================================

/// Production upstream client backed by a pooled `reqwest::Client`.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Build a client with a total per-call timeout and a connect timeout.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration, connect_timeout: Duration) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build upstream client: {e}")))?;

        Ok(Self { client })
    }

    /// Build a client from the upstream section of the configuration.
    pub fn from_config(config: &Config) -> ProxyResult<Self> {
        Self::new(config.upstream_timeout, config.upstream_connect_timeout)
    }
}

impl UpstreamClient for HttpUpstream {
    fn forward(&self, request: ProxyRequest) -> ForwardFuture<'_> {
        Box::pin(async move {
            let ProxyRequest {
                method,
                url,
                mut headers,
                body,
            } = request;

            // The client derives Host from the target URL.
            headers.remove(header::HOST);

            let body = reqwest::Body::wrap_stream(body.into_data_stream());
            let response = self
                .client
                .request(method, &url)
                .headers(headers)
                .body(body)
                .send()
                .await?;

            let status = response.status();
            let headers = response.headers().clone();
            debug!(%url, status = status.as_u16(), "Upstream responded");

            Ok(ProxyResponse {
                status,
                headers,
                body: Body::from_stream(response.bytes_stream()),
            })
        })
    }
}

// =============================================================================
// Scripted double
// =============================================================================

/// A request as observed by [`ScriptedUpstream`], with its body fully read.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One scripted reaction to a `forward` call.
#[derive(Debug)]
pub enum ScriptedOutcome {
    /// Respond with a complete body.
    Respond {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    /// Respond, then fail after streaming `first_chunk`.
    BrokenBody {
        status: StatusCode,
        headers: HeaderMap,
        first_chunk: Bytes,
    },
    /// Fail before any response is produced.
    Fail(TransportError),
    /// Never complete. The call only ends when its future is dropped,
    /// which [`ScriptedUpstream::abandoned_calls`] then reports.
    Hang,
}

#[derive(Default)]
struct ScriptState {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    received: Mutex<Vec<RecordedRequest>>,
    abandoned: AtomicUsize,
}

/// Counts a `forward` future as abandoned if it is dropped before it
/// produced an outcome.
struct CallGuard<'a> {
    state: &'a ScriptState,
    finished: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Upstream double that replays queued outcomes in order.
///
/// When the queue is empty every call fails with `TransportError::Request`.
#[derive(Clone, Default)]
pub struct ScriptedUpstream {
    state: Arc<ScriptState>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an arbitrary outcome.
    pub async fn push(&self, outcome: ScriptedOutcome) {
        self.state.outcomes.lock().await.push_back(outcome);
    }

    /// Queue a successful response. Header pairs may repeat a name.
    pub async fn respond(&self, status: StatusCode, headers: &[(&str, &str)], body: impl Into<Bytes>) {
        self.push(ScriptedOutcome::Respond {
            status,
            headers: header_map(headers),
            body: body.into(),
        })
        .await;
    }

    /// Queue a transport failure.
    pub async fn fail(&self, error: TransportError) {
        self.push(ScriptedOutcome::Fail(error)).await;
    }

    /// Every request received so far, oldest first.
    pub async fn received(&self) -> Vec<RecordedRequest> {
        self.state.received.lock().await.clone()
    }

    /// Number of `forward` calls made so far.
    pub async fn call_count(&self) -> usize {
        self.state.received.lock().await.len()
    }

    /// Number of `forward` calls whose future was dropped before it
    /// produced a response or an error.
    pub fn abandoned_calls(&self) -> usize {
        self.state.abandoned.load(Ordering::SeqCst)
    }
}

impl UpstreamClient for ScriptedUpstream {
    fn forward(&self, request: ProxyRequest) -> ForwardFuture<'_> {
        Box::pin(async move {
            let mut guard = CallGuard {
                state: &self.state,
                finished: false,
            };

            let body = match axum::body::to_bytes(request.body, usize::MAX).await {
                Ok(body) => body,
                Err(e) => {
                    guard.finished = true;
                    return Err(TransportError::Request(format!("reading request body: {e}")));
                }
            };

            self.state.received.lock().await.push(RecordedRequest {
                method: request.method,
                url: request.url,
                headers: request.headers,
                body,
            });

            let outcome = self.state.outcomes.lock().await.pop_front();
            let result = match outcome {
                Some(ScriptedOutcome::Respond {
                    status,
                    headers,
                    body,
                }) => Ok(ProxyResponse {
                    status,
                    headers,
                    body: Body::from(body),
                }),
                Some(ScriptedOutcome::BrokenBody {
                    status,
                    headers,
                    first_chunk,
                }) => {
                    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                        Ok(first_chunk),
                        Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            "upstream reset mid-body",
                        )),
                    ];
                    Ok(ProxyResponse {
                        status,
                        headers,
                        body: Body::from_stream(futures_util::stream::iter(chunks)),
                    })
                }
                Some(ScriptedOutcome::Fail(error)) => Err(error),
                Some(ScriptedOutcome::Hang) => std::future::pending().await,
                None => Err(TransportError::Request("no scripted outcome left".into())),
            };

            guard.finished = true;
            result
        })
    }
}

/// Build a multimap from name/value pairs, keeping repeats in order.
/// Invalid pairs are skipped.
pub fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(name.as_bytes()),
            header::HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers
}
