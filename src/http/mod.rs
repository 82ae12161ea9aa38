//! HTTP surface: router, shared state and the serve loop.

mod handlers;
mod middleware;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::service::PrintService;

pub use middleware::LogSink;

/// Header carrying the render job id on `/print` and `/mirror` responses.
pub const JOB_ID_HEADER: &str = "X-Job-Id";

const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

/// State shared by all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub service: PrintService,
    pub version: &'static str,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, service: PrintService) -> Self {
        Self {
            config,
            service,
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
        }
    }
}

/// Builds the application router.
///
/// Layers, outermost first: request log, CORS, gzip, request timeout.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/print", post(handlers::print))
        .route("/mirror", post(handlers::mirror))
        .route("/openapi.json", get(handlers::openapi))
        .route("/", get(handlers::docs))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::timeout_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::request_log_middleware))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(CORS_MAX_AGE)
}

/// Binds `0.0.0.0:<port>` and serves until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(config: Arc<Config>, service: PrintService, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_router(AppState::new(config, service));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on http://{}", addr);
    info!("Docs at http://{}/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
