//! Route handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Serialize;

use super::middleware::LogSink;
use super::{AppState, JOB_ID_HEADER};
use crate::config::MAX_URL_BODY_BYTES;
use crate::error::{ErrorResponse, ServiceError, ServiceResult};
use crate::job::RenderJob;
use crate::options::RenderOptions;
use crate::telemetry::record_job_telemetry;

const DEFAULT_FILENAME: &str = "document.pdf";

static OPENAPI_JSON: &str = include_str!("openapi.json");
static DOCS_HTML: &str = include_str!("docs.html");

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// GET/HEAD /health. axum drops the body for HEAD.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn openapi() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], OPENAPI_JSON)
}

pub async fn docs() -> Html<&'static str> {
    Html(DOCS_HTML)
}

pub async fn not_found() -> Response {
    let body = ErrorResponse {
        error: "not_found",
        message: "Not found".to_string(),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// POST /print: body is the HTML document.
pub async fn print(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    sink: LogSink,
    body: Body,
) -> Response {
    let job = RenderJob::print();

    let html = match read_capped(body, state.config.max_body_bytes).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => return finish(job, Err(e), &query, &sink),
    };

    let preview_max = state.config.payload_log_max_bytes;
    if preview_max > 0 {
        sink.add("payload_size", html.len().to_string());
        sink.add("payload_preview", truncate_on_char_boundary(&html, preview_max));
    }

    let options = RenderOptions::from_query(&query);
    let base_url = non_empty(query.get("base_url"));

    run_job(job, &query, &sink, state.service.render_direct(&html, base_url, options)).await
}

/// POST /mirror: body is the URL to fetch and render.
pub async fn mirror(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    sink: LogSink,
    body: Body,
) -> Response {
    let raw = match read_capped(body, MAX_URL_BODY_BYTES).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(e) => return finish(RenderJob::mirror(""), Err(e), &query, &sink),
    };

    let job = RenderJob::mirror(raw.clone());
    if raw.is_empty() {
        let err = ServiceError::invalid_input("request body must contain the URL");
        return finish(job, Err(err), &query, &sink);
    }
    sink.add("mirror_url", raw.clone());

    let options = RenderOptions::from_query(&query);
    let base_url = non_empty(query.get("base_url"));

    run_job(job, &query, &sink, state.service.render_from_url(&raw, base_url, options)).await
}

async fn run_job<F>(mut job: RenderJob, query: &HashMap<String, String>, sink: &LogSink, render: F) -> Response
where
    F: Future<Output = ServiceResult<Vec<u8>>>,
{
    job.start_processing();
    let result = render.await;
    finish(job, result, query, sink)
}

fn finish(
    mut job: RenderJob,
    result: ServiceResult<Vec<u8>>,
    query: &HashMap<String, String>,
    sink: &LogSink,
) -> Response {
    sink.add("job_id", job.job_id.clone());

    let mut response = match result {
        Ok(pdf) => {
            job.mark_complete(pdf.len());
            pdf_response(pdf, query.get("filename").map(String::as_str))
        }
        Err(err) => {
            sink.add("error", err.to_string());
            job.mark_failed(err.to_string());
            err.into_response()
        }
    };

    record_job_telemetry(&job);

    if let Ok(value) = HeaderValue::from_str(&job.job_id) {
        response.headers_mut().insert(JOB_ID_HEADER, value);
    }
    response
}

fn pdf_response(pdf: Vec<u8>, filename: Option<&str>) -> Response {
    let disposition = format!("inline; filename=\"{}\"", sanitize_filename(filename));
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("inline; filename=\"document.pdf\""));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        pdf,
    )
        .into_response()
}

/// Strips quotes and control characters; empty names become `document.pdf`.
pub(crate) fn sanitize_filename(name: Option<&str>) -> String {
    let cleaned: String = name
        .unwrap_or_default()
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Reads at most `limit` bytes. One byte more is a 413.
async fn read_capped(body: Body, limit: usize) -> ServiceResult<Bytes> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ServiceError::internal(format!("failed to read body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(ServiceError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buf))
}

fn truncate_on_char_boundary(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
