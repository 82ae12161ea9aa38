//! Telemetry and structured logging for render jobs.

use crate::job::{JobStatus, RenderJob};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TRACER_NAME: &str = "trykkeri-api";

/// Jobs slower than this are logged as a warning.
const SLOW_JOB_THRESHOLD_MS: i64 = 5000;

/// Records telemetry for a completed or failed job.
///
/// Emits an OpenTelemetry span plus a structured log line carrying:
/// - Job kind and duration (ms)
/// - Success/failure status
/// - PDF size on success, error text on failure
pub fn record_job_telemetry(job: &RenderJob) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("render_job");

    span.set_attribute(KeyValue::new("job_id", job.job_id.clone()));
    span.set_attribute(KeyValue::new("kind", job.kind.to_string()));
    span.set_attribute(KeyValue::new("status", job.status.to_string()));

    if let Some(ref url) = job.source_url {
        span.set_attribute(KeyValue::new("source_url", url.clone()));
    }
    if let Some(bytes) = job.pdf_bytes {
        span.set_attribute(KeyValue::new("pdf_bytes", bytes as i64));
    }

    if let Some(duration_ms) = job.processing_duration_ms() {
        span.set_attribute(KeyValue::new("duration_ms", duration_ms));

        info!(
            job_id = %job.job_id,
            kind = %job.kind,
            duration_ms = duration_ms,
            status = %job.status,
            "Render job finished"
        );

        if duration_ms > SLOW_JOB_THRESHOLD_MS {
            warn!(
                job_id = %job.job_id,
                duration_ms = duration_ms,
                "Render job exceeded performance threshold (5000ms)"
            );
        }
    }

    if job.status == JobStatus::Failed {
        if let Some(ref error) = job.error {
            span.set_attribute(KeyValue::new("error", error.clone()));
            warn!(
                job_id = %job.job_id,
                kind = %job.kind,
                error = %error,
                "Render job failed"
            );
        }
    }

    span.end();
}

/// Installs the global tracing subscriber.
///
/// Level comes from `RUST_LOG` (default `info`); `json` switches the
/// formatter to one JSON object per line.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initializes OpenTelemetry with OTLP exporter.
///
/// Called once at startup. Reads configuration from environment variables:
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - Collector endpoint (default: http://localhost:4317)
/// - `OTEL_SERVICE_NAME` - Service name (default: trykkeri-api)
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| TRACER_NAME.to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}
