//! Hostname resolution capability used by the fetcher.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;

/// Resolves a hostname to its candidate addresses.
///
/// Swappable so redirect and resolution logic can be driven without real DNS.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;

        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }

        debug!(host = %host, candidates = ips.len(), "Resolved host");
        Ok(ips)
    }
}
