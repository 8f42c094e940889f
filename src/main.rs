use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use posts_proxy::{
    AppState, Config, HttpUpstream, ProxyServer, ShutdownOutcome, build_router, logging, metrics,
    server,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration before logging so LOG_LEVEL / LOG_FORMAT apply
    let config = Config::from_env();
    let bootstrap = config.as_ref().cloned().unwrap_or_default();
    logging::init_tracing(&bootstrap);

    let config = config.map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;

    info!("Starting posts proxy v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.host,
        port = %config.port,
        upstream = %config.upstream_base_url,
        upstream_timeout = ?config.upstream_timeout,
        read_timeout = ?config.connection_read_timeout,
        idle_timeout = ?config.connection_idle_timeout,
        status_policy = %config.upstream_status_policy,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    let upstream = HttpUpstream::from_config(&config).map_err(|e| {
        error!("Failed to build upstream client: {e}");
        exitcode::SOFTWARE
    })?;

    let state = AppState::new(Arc::new(upstream), config.clone());
    let app = build_router(state);

    let proxy_server = ProxyServer::bind(&config, app).await.map_err(|e| {
        error!("Failed to bind to {}: {e}", config.server_addr());
        exitcode::UNAVAILABLE
    })?;

    info!("API endpoints:");
    info!("  GET  /health          - Health check");
    info!("  *    /api/posts       - Proxied collection (GET, POST)");
    info!("  *    /api/posts/{{id}}  - Proxied item (GET, PUT, PATCH, DELETE)");

    let outcome = proxy_server
        .run_until(server::shutdown_signal(), config.shutdown_grace)
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    match outcome {
        ShutdownOutcome::Drained => info!("Server shutdown complete"),
        ShutdownOutcome::Aborted => info!("Server shutdown complete, some requests were cut off"),
    }
    Ok(())
}
