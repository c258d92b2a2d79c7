//! Asynchronous hostname resolution.

use std::net::IpAddr;

use async_trait::async_trait;

/// Errors returned by a [`Resolver`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The system lookup failed.
    #[error("cannot resolve {hostname}: {source}")]
    Lookup {
        /// Hostname that was looked up.
        hostname: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The lookup succeeded but returned no address.
    #[error("no address found for {0}")]
    NoAddress(String),
}

/// Hostname-to-address lookup performed before the first network use.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname` to a single address.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when no address can be found.
    async fn resolve(&self, hostname: &str) -> Result<IpAddr, ResolveError>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, hostname: &str) -> Result<IpAddr, ResolveError> {
        let addrs = tokio::net::lookup_host((hostname, 0))
            .await
            .map_err(|source| ResolveError::Lookup {
                hostname: hostname.to_owned(),
                source,
            })?;
        let addrs: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        // Prefer IPv4; the API host is reachable over it everywhere.
        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ResolveError::NoAddress(hostname.to_owned()))
    }
}

/// Resolver that always answers with a fixed address.
///
/// Used when the config pins the API host (proxies, local mocks).
#[derive(Debug, Clone, Copy)]
pub struct StaticResolver(pub IpAddr);

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, _hostname: &str) -> Result<IpAddr, ResolveError> {
        Ok(self.0)
    }
}
