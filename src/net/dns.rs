//! Upstream host name resolution.
//!
//! # Responsibilities
//! - Resolve upstream host names once, at startup
//! - Leave literal addresses untouched
//!
//! # Design Decisions
//! - A single configured name server (plain UDP/TCP on port 53)
//! - The first returned address wins
//! - An empty answer is an error, never a silent skip

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveError;
use hickory_resolver::TokioAsyncResolver;

/// Timeout for a single lookup.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

const DNS_PORT: u16 = 53;

/// Error type for name resolution.
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("invalid DNS server address '{0}'")]
    InvalidServer(String),

    #[error("failed to resolve '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: ResolveError,
    },

    #[error("no address found for '{0}'")]
    NoAddress(String),
}

/// Resolver bound to one name server.
pub struct DnsResolver {
    server: IpAddr,
    inner: TokioAsyncResolver,
}

impl DnsResolver {
    /// Create a resolver querying `server` (a literal IP address).
    pub fn new(server: &str) -> Result<Self, DnsError> {
        let ip: IpAddr = server
            .trim()
            .parse()
            .map_err(|_| DnsError::InvalidServer(server.to_string()))?;

        let group = NameServerConfigGroup::from_ips_clear(&[ip], DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = LOOKUP_TIMEOUT;

        tracing::debug!(server = %SocketAddr::new(ip, DNS_PORT), "DNS resolver configured");

        Ok(Self {
            server: ip,
            inner: TokioAsyncResolver::tokio(config, opts),
        })
    }

    /// Name server this resolver queries.
    pub fn server(&self) -> IpAddr {
        self.server
    }

    /// Resolve `host` to a single address.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, DnsError> {
        if let Some(ip) = literal(host) {
            return Ok(ip);
        }

        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|source| DnsError::Lookup {
                host: host.to_string(),
                source,
            })?;

        let ip = lookup
            .iter()
            .next()
            .ok_or_else(|| DnsError::NoAddress(host.to_string()))?;

        tracing::info!(host = %host, address = %ip, "Upstream host resolved");
        Ok(ip)
    }
}

/// Parse `host` as a literal address, accepting bracketed IPv6.
pub fn literal(host: &str) -> Option<IpAddr> {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse().ok()
}
