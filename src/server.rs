//! Listener lifecycle: bind, serve, drain within a bounded grace period.
//!
//! ```text
//! bind ──▶ serving ──signal──▶ draining ──all done──▶ stopped
//!                                  │
//!                                  └──grace elapsed──▶ aborted
//! ```
//!
//! Each accepted connection is served by its own task, tracked in a
//! `JoinSet`. While draining, the listener is closed and every connection is
//! asked to finish its current exchange and close. When the grace period
//! elapses the remaining connection tasks are aborted; this drops their
//! in-flight handler futures, which also cancels their upstream calls.
//!
//! # Connection limits
//!
//! - **Read**: a request head must arrive within `read_timeout`
//! - **Idle**: a connection with no request started or answered for
//!   `idle_timeout` is closed once its current exchange, if any, completes
//!
//! Writing a proxied body is bounded by the upstream client's total timeout.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Pause after a failed `accept` so descriptor exhaustion does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// How a serve loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request completed within the grace period.
    Drained,
    /// The grace period elapsed and remaining connections were dropped.
    Aborted,
}

/// Per-connection I/O bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
}

impl ConnectionLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            read_timeout: config.connection_read_timeout,
            idle_timeout: config.connection_idle_timeout,
        }
    }

    fn builder(&self) -> Builder<TokioExecutor> {
        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.read_timeout)
            .keep_alive(true);
        builder
            .http2()
            .timer(TokioTimer::new())
            .keep_alive_interval(self.idle_timeout)
            .keep_alive_timeout(self.read_timeout);
        builder
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A bound listener plus the router it will serve.
pub struct ProxyServer {
    listener: TcpListener,
    router: Router,
    limits: ConnectionLimits,
}

impl ProxyServer {
    /// Bind the listener for `config.server_addr()`.
    ///
    /// # Errors
    ///
    /// Returns the bind error; this is fatal at startup.
    pub async fn bind(config: &Config, router: Router) -> io::Result<Self> {
        let listener = TcpListener::bind(config.server_addr()).await?;
        Ok(Self::from_listener(listener, router).with_limits(ConnectionLimits::from_config(config)))
    }

    /// Wrap an already bound listener, with default connection limits.
    pub fn from_listener(listener: TcpListener, router: Router) -> Self {
        Self {
            listener,
            router,
            limits: ConnectionLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ConnectionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `signal` resolves, then drain for at most `grace`.
    ///
    /// Returns only once the listener is closed and every connection task
    /// has finished or been aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener address cannot be read. Failed
    /// `accept` calls are logged and do not stop the server.
    pub async fn run_until<F>(self, signal: F, grace: Duration) -> io::Result<ShutdownOutcome>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            listener,
            router,
            limits,
        } = self;

        let addr = listener.local_addr()?;
        let builder = limits.builder();
        let stop = CancellationToken::new();
        let mut connections = JoinSet::new();

        info!(%addr, "Server listening");

        tokio::pin!(signal);
        loop {
            tokio::select! {
                () = &mut signal => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            router.clone(),
                            builder.clone(),
                            limits.idle_timeout,
                            stop.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(listener);
        info!(
            grace = ?grace,
            connections = connections.len(),
            "Shutting down, draining in-flight requests"
        );
        stop.cancel();

        let drain = async {
            while let Some(joined) = connections.join_next().await {
                log_join(joined);
            }
        };

        if tokio::time::timeout(grace, drain).await.is_ok() {
            info!("Server stopped");
            return Ok(ShutdownOutcome::Drained);
        }

        warn!(
            grace = ?grace,
            connections = connections.len(),
            "Grace period elapsed, closing remaining connections"
        );
        connections.shutdown().await;
        Ok(ShutdownOutcome::Aborted)
    }
}

/// Serve one connection until it closes, goes idle, or the server stops.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    builder: Builder<TokioExecutor>,
    idle_timeout: Duration,
    stop: CancellationToken,
) {
    let (activity_tx, activity_rx) = watch::channel(Instant::now());
    let activity_tx = Arc::new(activity_tx);

    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
        let activity = Arc::clone(&activity_tx);
        activity.send_replace(Instant::now());
        let response = router.clone().oneshot(req);
        async move {
            let response: Result<_, Infallible> = response.await;
            activity.send_replace(Instant::now());
            response
        }
    });

    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let idle = idle_elapsed(activity_rx, idle_timeout);
    tokio::pin!(idle);

    let mut closing = false;
    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    debug!(%peer, error = %e, "Connection closed with error");
                }
                return;
            }
            () = stop.cancelled(), if !closing => {
                closing = true;
                connection.as_mut().graceful_shutdown();
            }
            () = &mut idle, if !closing => {
                debug!(%peer, idle = ?idle_timeout, "Closing idle connection");
                closing = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Resolve once `idle` has passed since the last recorded activity.
async fn idle_elapsed(mut activity: watch::Receiver<Instant>, idle: Duration) {
    loop {
        let deadline = *activity.borrow_and_update() + idle;
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => return,
            changed = activity.changed() => {
                if changed.is_err() {
                    // Connection service is gone; the connection is closing anyway.
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        error!(error = %e, "Connection task panicked");
    }
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
///
/// If a handler cannot be installed the failure is logged and that source
/// is ignored; the process can still be stopped through the other one.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => warn!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => warn!("Received SIGTERM, initiating graceful shutdown"),
    }
}
