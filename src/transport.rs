//! Single-hop HTTP transport pinned to a validated address.
//!
//! The fetcher owns resolution, validation and redirect policy. A transport
//! only performs one GET against one literal address and reports either a
//! redirect target or the (size-bounded) final body.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy as RedirectPolicy;
use thiserror::Error;
use url::Url;

/// User agent sent on mirror fetches.
pub const MIRROR_USER_AGENT: &str = "Trykkeri-API-Mirror/1.0";

/// Per-candidate connect timeout.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopResponse {
    /// 301/302/303/307/308 carrying a `Location` header (not yet resolved against the URL).
    Redirect { status: u16, location: String },
    /// Anything else, with the body read in full.
    Final { status: u16, body: Vec<u8> },
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not connect or the exchange failed before a response arrived.
    /// The fetcher moves on to the next candidate address.
    #[error("connect failed: {0}")]
    Connect(String),

    /// An established connection stalled.
    #[error("timed out")]
    Timeout,

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read response: {0}")]
    Body(String),
}

/// Performs one GET of `url`, connecting to `addr` and nowhere else.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &Url,
        addr: SocketAddr,
        max_body_bytes: usize,
    ) -> Result<HopResponse, TransportError>;
}

/// reqwest-backed transport. Builds a fresh client per hop with the hostname
/// pinned to the validated address, so TLS SNI and `Host` keep the original
/// name while the socket goes to the literal IP.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    connect_timeout: Duration,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DIAL_TIMEOUT,
            user_agent: MIRROR_USER_AGENT.to_string(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn build_client(&self, url: &Url, addr: SocketAddr) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .redirect(RedirectPolicy::none())
            .no_proxy()
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent);

        // A literal host is already the address we validated.
        if let Some(host) = url.host_str() {
            let literal = host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .is_ok();
            if !literal {
                builder = builder.resolve(host, addr);
            }
        }

        builder
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to build HTTP client: {e}")))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        url: &Url,
        addr: SocketAddr,
        max_body_bytes: usize,
    ) -> Result<HopResponse, TransportError> {
        let client = self.build_client(url, addr)?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_send_error(e.is_connect(), e.is_timeout(), e.to_string()))?;

        let status = response.status().as_u16();
        if matches!(status, 301 | 302 | 303 | 307 | 308) {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if let Some(location) = location {
                return Ok(HopResponse::Redirect { status, location });
            }
        }

        if let Some(len) = response.content_length() {
            if len > max_body_bytes as u64 {
                return Err(TransportError::TooLarge {
                    limit: max_body_bytes,
                });
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;
            if body.len() + chunk.len() > max_body_bytes {
                return Err(TransportError::TooLarge {
                    limit: max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HopResponse::Final { status, body })
    }
}

/// A connect timeout counts as a connect failure. Only a stall on an
/// established connection is [`TransportError::Timeout`].
fn classify_send_error(is_connect: bool, is_timeout: bool, message: String) -> TransportError {
    if is_connect {
        TransportError::Connect(message)
    } else if is_timeout {
        TransportError::Timeout
    } else {
        TransportError::Connect(message)
    }
}
