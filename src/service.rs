//! Entry points used by the HTTP layer: direct render and mirror render.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::fetcher::{FetchLimits, SafeFetcher};
use crate::options::RenderOptions;
use crate::renderer::{RenderRequest, Renderer, RendererConfig, WkhtmltopdfBackend};

/// Fetcher + renderer pair. Cheap to clone, holds no request state.
#[derive(Clone)]
pub struct PrintService {
    renderer: Renderer,
    fetcher: SafeFetcher,
    fetch_limits: FetchLimits,
}

impl PrintService {
    pub fn new(renderer: Renderer, fetcher: SafeFetcher, fetch_limits: FetchLimits) -> Self {
        Self {
            renderer,
            fetcher,
            fetch_limits,
        }
    }

    /// Production wiring: wkhtmltopdf, system resolver, reqwest transport.
    pub fn from_config(config: &Config) -> Self {
        let renderer = Renderer::new(RendererConfig::from(config), Arc::new(WkhtmltopdfBackend));
        let fetch_limits = FetchLimits {
            max_body_bytes: config.max_body_bytes,
            timeout: config.fetch_timeout,
            ..FetchLimits::default()
        };
        Self::new(renderer, SafeFetcher::system(), fetch_limits)
    }

    /// Renders caller-supplied HTML.
    pub async fn render_direct(
        &self,
        html: &str,
        base_url: Option<String>,
        options: Option<RenderOptions>,
    ) -> ServiceResult<Vec<u8>> {
        if html.trim().is_empty() {
            return Err(ServiceError::invalid_input("HTML content cannot be empty"));
        }

        let request = RenderRequest::new(html, base_url, options);
        self.renderer.render(&request).await
    }

    /// Fetches `url` through the SSRF-safe fetcher, then renders the page.
    ///
    /// Relative resources resolve against `base_url` when given, otherwise
    /// against `url` itself.
    pub async fn render_from_url(
        &self,
        url: &str,
        base_url: Option<String>,
        options: Option<RenderOptions>,
    ) -> ServiceResult<Vec<u8>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ServiceError::invalid_input("request body must contain the URL"));
        }

        let page = self.fetcher.fetch(url, &self.fetch_limits).await?;
        debug!(final_url = %page.final_url, redirects = page.redirects, "Mirror fetch complete");

        let html = String::from_utf8_lossy(&page.body);
        if html.trim().is_empty() {
            return Err(ServiceError::invalid_input("target page returned empty content"));
        }

        let base_url = base_url.unwrap_or_else(|| url.to_string());
        info!(url = %url, html_bytes = page.body.len(), "Rendering mirrored page");

        let request = RenderRequest::new(html.into_owned(), Some(base_url), options);
        self.renderer.render(&request).await
    }
}
