//! Trykkeri API Library
//!
//! HTML-to-PDF rendering behind a small HTTP API. Documents arrive either
//! as HTML in the request body (`/print`) or as a URL the service fetches
//! itself (`/mirror`); either way wkhtmltopdf turns them into PDF bytes.
//!
//! ## Module Overview
//!
//! - `address_policy`: blocked address ranges for outbound fetches
//! - `resolver`: DNS lookup behind an injectable trait
//! - `transport`: one pinned HTTP hop over reqwest
//! - `fetcher`: SSRF-safe fetch with per-hop validation and redirect cap
//! - `options`: page layout options and their defaults
//! - `renderer`: wkhtmltopdf invocation in a per-render scratch directory
//! - `service`: direct and mirror render entry points
//! - `job`: per-request render job records
//! - `error`: error taxonomy and HTTP mapping
//! - `config`: environment configuration
//! - `telemetry`: OpenTelemetry spans and log setup
//! - `http`: axum router, handlers and middleware
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trykkeri_api::{config::Config, service::PrintService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env();
//!     let service = PrintService::from_config(&config);
//!
//!     let pdf = service
//!         .render_direct("<h1>Hello</h1>", None, None)
//!         .await
//!         .unwrap();
//!     assert!(pdf.starts_with(b"%PDF"));
//! }
//! ```

pub mod address_policy;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod job;
pub mod options;
pub mod renderer;
pub mod resolver;
pub mod service;
pub mod telemetry;
pub mod transport;

pub use error::{ServiceError, ServiceResult};
