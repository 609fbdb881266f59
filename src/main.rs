use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use whatsapp_relay::{AppState, Config, LogFormat, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration decides the log format, so it loads before logging.
    let config = Config::from_env();

    let format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or(LogFormat::Text);
    init_tracing(format);

    info!(
        "Starting WhatsApp Relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Initialize the global tracing subscriber.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        api_version = %config.whatsapp_api_version,
        rate_limit = config.rate_limit_max_requests,
        auth = config.auth_enabled(),
        "Configuration loaded"
    );

    if !config.provider_configured() {
        warn!("WHATSAPP_API_TOKEN or WHATSAPP_PHONE_NUMBER_ID not set; sends will fail");
    }

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    // Build application state and router
    let state = AppState::new(config).map_err(|e| {
        error!("Failed to build application state: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone()).map_err(|e| {
        error!("Failed to build router: {e}");
        exitcode::CONFIG
    })?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /                                  - Service info");
    info!("  GET  /health                            - Health check");
    info!("  POST /api/v1/messages/                  - Send any template");
    info!("  POST /api/v1/messages/text              - Send a text message");
    info!("  POST /api/v1/messages/hello-world       - Send hello_world");
    info!("  POST /api/v1/messages/order-confirm     - Send order confirmation");
    info!("  POST /api/v1/messages/account-created   - Send account created notice");

    // Peer addresses feed the per-client rate limiter
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

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
