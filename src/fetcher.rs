//! SSRF-safe outbound fetcher for mirror requests.
//!
//! Every hop goes through the same pipeline:
//!
//! 1. scheme must be `http` or `https`, host must be present
//! 2. a literal host is checked directly, a name is resolved once
//! 3. if *any* candidate address is blocked the whole request is rejected
//! 4. the transport connects to the validated literal address, trying
//!    candidates in order until one answers
//!
//! Redirects are never followed by the HTTP client; each `Location` is fed
//! back through steps 1-4 until the hop limit is reached.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::address_policy;
use crate::error::{ServiceError, ServiceResult};
use crate::resolver::{Resolver, SystemResolver};
use crate::transport::{HopResponse, ReqwestTransport, Transport, TransportError};

/// Maximum number of redirects followed for one fetch.
pub const MAX_REDIRECTS: usize = 10;

/// Default overall deadline for one fetch, redirects included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const BLOCKED_TARGET: &str = "url must not target private/internal addresses";

/// Bounds applied to one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    /// Ceiling on the response body.
    pub max_body_bytes: usize,
    /// Deadline for the whole fetch.
    pub timeout: Duration,
    /// Redirect hop cap.
    pub max_redirects: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 2_000_000,
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_redirects: MAX_REDIRECTS,
        }
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL of the final hop.
    pub final_url: Url,
    pub status: u16,
    pub body: Vec<u8>,
    pub redirects: usize,
}

/// Hostname and the addresses it resolved to for one hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCandidate {
    pub host: String,
    pub addrs: Vec<IpAddr>,
}

/// Fetches caller-supplied URLs without letting the caller steer egress
/// toward internal addresses.
#[derive(Clone)]
pub struct SafeFetcher {
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn Transport>,
}

impl SafeFetcher {
    pub fn new(resolver: Arc<dyn Resolver>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            transport,
        }
    }

    /// Fetcher using the system resolver and a reqwest transport.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemResolver), Arc::new(ReqwestTransport::new()))
    }

    /// Fetches `raw_url` and returns the final page body.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for malformed URLs, disallowed schemes, blocked or
    ///   unresolvable hosts, and redirect chains longer than the limit
    /// - `PayloadTooLarge` when the body exceeds `limits.max_body_bytes`
    /// - `Timeout` when the whole fetch overruns `limits.timeout`
    /// - `PdfGeneration` when no candidate could be reached or the final
    ///   status is not 2xx
    pub async fn fetch(&self, raw_url: &str, limits: &FetchLimits) -> ServiceResult<FetchedPage> {
        match tokio::time::timeout(limits.timeout, self.fetch_inner(raw_url, limits)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %raw_url, timeout_ms = limits.timeout.as_millis() as u64, "Fetch timed out");
                Err(ServiceError::Timeout)
            }
        }
    }

    async fn fetch_inner(&self, raw_url: &str, limits: &FetchLimits) -> ServiceResult<FetchedPage> {
        let mut url = parse_target(raw_url)?;
        let mut redirects = 0;

        loop {
            let candidate = self.resolve(&url).await?;
            let port = url
                .port_or_known_default()
                .ok_or_else(|| ServiceError::invalid_input("url must have a port"))?;

            match self.send_pinned(&url, &candidate, port, limits).await? {
                HopResponse::Redirect { status, location } => {
                    if redirects >= limits.max_redirects {
                        return Err(ServiceError::invalid_input("too many redirects"));
                    }
                    let next = url.join(&location).map_err(|e| {
                        ServiceError::invalid_input(format!("invalid redirect location: {e}"))
                    })?;
                    validate_target(&next)?;

                    debug!(from = %url, to = %next, status, "Following redirect");
                    url = next;
                    redirects += 1;
                }
                HopResponse::Final { status, body } => {
                    if !(200..300).contains(&status) {
                        return Err(ServiceError::pdf_generation(format!(
                            "fetch failed: {}",
                            status_text(status)
                        )));
                    }

                    info!(url = %url, status, bytes = body.len(), redirects, "Fetched page");
                    return Ok(FetchedPage {
                        final_url: url,
                        status,
                        body,
                        redirects,
                    });
                }
            }
        }
    }

    /// Produces the validated candidate list for one hop.
    async fn resolve(&self, url: &Url) -> ServiceResult<ResolvedCandidate> {
        let host = url
            .host()
            .ok_or_else(|| ServiceError::invalid_input("url must have a host"))?;

        let (name, addrs) = match host {
            Host::Ipv4(ip) => (ip.to_string(), vec![IpAddr::V4(ip)]),
            Host::Ipv6(ip) => (ip.to_string(), vec![IpAddr::V6(ip)]),
            Host::Domain(domain) => {
                let addrs = self.resolver.lookup(domain).await.map_err(|e| {
                    ServiceError::invalid_input(format!("failed to resolve host: {e}"))
                })?;
                (domain.to_string(), addrs)
            }
        };

        if addrs.is_empty() {
            return Err(ServiceError::invalid_input(
                "url host did not resolve to any addresses",
            ));
        }

        for ip in &addrs {
            if let Some(prefix) = address_policy::blocked_prefix(*ip) {
                warn!(host = %name, ip = %ip, range = %prefix, "Blocked fetch to internal address");
                return Err(ServiceError::invalid_input(BLOCKED_TARGET));
            }
        }

        Ok(ResolvedCandidate { host: name, addrs })
    }

    /// Tries each candidate address in order; first answer wins.
    async fn send_pinned(
        &self,
        url: &Url,
        candidate: &ResolvedCandidate,
        port: u16,
        limits: &FetchLimits,
    ) -> ServiceResult<HopResponse> {
        let mut last_error: Option<String> = None;

        for ip in &candidate.addrs {
            let addr = SocketAddr::new(*ip, port);
            match self.transport.send(url, addr, limits.max_body_bytes).await {
                Ok(response) => return Ok(response),
                Err(TransportError::Connect(e)) => {
                    debug!(host = %candidate.host, addr = %addr, error = %e, "Candidate failed");
                    last_error = Some(e);
                }
                Err(TransportError::Timeout) => return Err(ServiceError::Timeout),
                Err(TransportError::TooLarge { .. }) => return Err(ServiceError::PayloadTooLarge),
                Err(TransportError::Body(e)) => {
                    return Err(ServiceError::internal(format!("failed to read response: {e}")))
                }
            }
        }

        Err(ServiceError::pdf_generation(format!(
            "fetch failed: {}",
            last_error.unwrap_or_else(|| "no reachable address".to_string())
        )))
    }
}

/// Parses and validates a caller-supplied URL before any network activity.
pub fn parse_target(raw_url: &str) -> ServiceResult<Url> {
    let url = Url::parse(raw_url)
        .map_err(|e| ServiceError::invalid_input(format!("invalid url: {e}")))?;
    validate_target(&url)?;
    Ok(url)
}

/// Scheme, host and literal-address checks shared by the first hop and
/// every redirect target.
pub fn validate_target(url: &Url) -> ServiceResult<()> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ServiceError::invalid_input(
            "url scheme must be http or https",
        ));
    }

    let host = match url.host() {
        Some(Host::Domain("")) | None => {
            return Err(ServiceError::invalid_input("url must have a host"));
        }
        Some(host) => host,
    };

    let literal = match host {
        Host::Ipv4(ip) => Some(IpAddr::V4(ip)),
        Host::Ipv6(ip) => Some(IpAddr::V6(ip)),
        Host::Domain(_) => None,
    };
    if let Some(ip) = literal {
        if address_policy::is_blocked(ip) {
            return Err(ServiceError::invalid_input(BLOCKED_TARGET));
        }
    }

    Ok(())
}

fn status_text(status: u16) -> String {
    StatusCode::from_u16(status)
        .map(|s| s.to_string())
        .unwrap_or_else(|_| status.to_string())
}
