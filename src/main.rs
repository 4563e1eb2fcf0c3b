use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use response_sizer::metrics::try_init_metrics;
use response_sizer::{AppState, Config, HttpFetcher, build_router, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Pick up RUST_LOG and LOG_FORMAT from .env before logging starts
    let _ = dotenvy::dotenv();
    init_tracing();

    info!(
        "Starting Response Sizer v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Install the global subscriber; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        rate_limit_requests = config.rate_limit_requests,
        rate_limit_window_ms = config.rate_limit_window.as_millis(),
        client_key = %config.client_key_source,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        try_init_metrics(metrics_addr);
    } else {
        info!("Metrics export disabled (METRICS_PORT=0)");
    }

    let fetcher = HttpFetcher::new(config.fetch_timeout).map_err(|e| {
        error!("Failed to build HTTP client: {e}");
        exitcode::SOFTWARE
    })?;

    // Build application state and router
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let state = AppState::new(config, Arc::new(fetcher)).map_err(|e| {
        error!("Invalid rate limit configuration: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    // Start server
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  POST /        - Fetch URLs (one per line) and report body sizes");
    info!("  GET  /health  - Health check");

    // Peer addresses feed the rate limiter's client keys
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
