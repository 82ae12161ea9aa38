//! Trykkeri API server
//!
//! Renders caller-supplied HTML, or a fetched public page, to PDF with
//! wkhtmltopdf.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT`: listen port (default: 8080)
//! - `MAX_BODY_BYTES`: `/print` body and mirror page ceiling (default: 2000000)
//! - `RENDER_TIMEOUT_MS` / `FETCH_TIMEOUT_MS`: deadlines (default: 30000 / 15000)
//! - `WKHTMLTOPDF_PATH`: converter binary (default: wkhtmltopdf)
//! - `ALLOW_NET`, `ALLOWLIST_PATHS`, `CORS_ORIGINS`, `JSON_LOGS`, `PAYLOAD_LOG_MAX_BYTES`
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector endpoint
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use trykkeri_api::config::Config;
use trykkeri_api::http::serve_with_shutdown;
use trykkeri_api::service::PrintService;
use trykkeri_api::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env());

    telemetry::init_logging(config.json_logs);

    if let Err(e) = telemetry::init_telemetry() {
        warn!("Failed to initialize telemetry: {}", e);
    }

    info!(
        port = config.port,
        wkhtmltopdf = %config.wkhtmltopdf_path.display(),
        render_timeout_ms = config.render_timeout.as_millis() as u64,
        allow_net = config.allow_net,
        "Starting trykkeri-api"
    );

    let service = PrintService::from_config(&config);
    serve_with_shutdown(config, service, shutdown_signal()).await?;

    opentelemetry::global::shutdown_tracer_provider();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
