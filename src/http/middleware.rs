//! Request logging and request timeout.

use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::time::timeout;
use tracing::{error, info};

use super::AppState;
use crate::error::ServiceError;

/// Per-request attribute sink. Handlers attach key/value pairs; the request
/// log middleware writes them on the request's log line.
///
/// Extracting it outside the middleware yields a detached sink whose
/// writes go nowhere.
#[derive(Debug, Clone, Default)]
pub struct LogSink(Option<Arc<Mutex<Vec<(&'static str, String)>>>>);

impl LogSink {
    fn attached() -> Self {
        Self(Some(Arc::new(Mutex::new(Vec::new()))))
    }

    pub fn add(&self, key: &'static str, value: impl Into<String>) {
        if let Some(attrs) = &self.0 {
            if let Ok(mut attrs) = attrs.lock() {
                attrs.push((key, value.into()));
            }
        }
    }

    fn render(&self) -> String {
        let Some(attrs) = &self.0 else {
            return String::new();
        };
        let Ok(attrs) = attrs.lock() else {
            return String::new();
        };
        attrs
            .iter()
            .map(|(k, v)| format!("{k}={v:?}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<S: Send + Sync> FromRequestParts<S> for LogSink {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<LogSink>().cloned().unwrap_or_default())
    }
}

/// One log line per request. 4xx and 5xx are logged at error level.
pub async fn request_log_middleware(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let sink = LogSink::attached();
    request.extensions_mut().insert(sink.clone());

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    let attrs = sink.render();

    if status >= 400 {
        error!(method = %method, uri = %path, status, duration_ms, attrs = %attrs, "request");
    } else {
        info!(method = %method, uri = %path, status, duration_ms, attrs = %attrs, "request");
    }

    response
}

/// Caps the whole request at render timeout + grace.
pub async fn timeout_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let sink = request.extensions().get::<LogSink>().cloned().unwrap_or_default();
    with_deadline(state.config.request_timeout(), &sink, next.run(request)).await
}

/// The handler future is dropped on expiry, so the error is recorded here.
async fn with_deadline<F>(limit: Duration, sink: &LogSink, handler: F) -> Response
where
    F: Future<Output = Response>,
{
    match timeout(limit, handler).await {
        Ok(response) => response,
        Err(_) => {
            error!("Request timed out after {:?}", limit);
            let err = ServiceError::Timeout;
            sink.add("error", err.to_string());
            err.into_response()
        }
    }
}
