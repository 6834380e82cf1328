use crate::lookup::{with_timeout, DnsLookup, LookupError};
use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    TokioAsyncResolver,
};
use std::{net::IpAddr, time::Duration};
use tracing::warn;

pub struct HickoryDnsLookup {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryDnsLookup {
    /// Uses the host's resolver configuration, falling back to the defaults
    /// when it cannot be read. One attempt per query, bounded by `timeout`.
    pub fn from_system_conf(timeout: Duration) -> Self {
        let (config, opts) = hickory_resolver::system_conf::read_system_conf().unwrap_or_else(|e| {
            warn!("Failed to read system resolver config: {}, using defaults", e);
            (ResolverConfig::default(), ResolverOpts::default())
        });
        Self::new(config, opts, timeout)
    }

    pub fn new(config: ResolverConfig, mut opts: ResolverOpts, timeout: Duration) -> Self {
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
        }
    }

    async fn query_a(&self, host: &str) -> Result<(), LookupError> {
        let lookup = self.resolver.ipv4_lookup(host).await.map_err(LookupError::from)?;
        if lookup.iter().next().is_some() {
            Ok(())
        } else {
            Err(LookupError::NotFound)
        }
    }
}

#[async_trait]
impl DnsLookup for HickoryDnsLookup {
    async fn resolve_a(&self, host: &str) -> Result<(), LookupError> {
        let host = host.trim_end_matches('.');
        if host.is_empty() || host.parse::<IpAddr>().is_ok() {
            return Err(LookupError::InvalidHost(host.to_string()));
        }

        with_timeout(self.timeout, self.query_a(host)).await
    }
}

impl From<ResolveError> for LookupError {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => LookupError::NotFound,
            ResolveErrorKind::Timeout => LookupError::Timeout,
            _ => LookupError::Network(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::config::{NameServerConfig, Protocol};
    use std::time::Instant;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_ip_literal_is_not_resolved() {
        let dns = HickoryDnsLookup::from_system_conf(Duration::from_secs(1));
        assert!(matches!(dns.resolve_a("192.0.2.10").await, Err(LookupError::InvalidHost(_))));
        assert!(matches!(dns.resolve_a("").await, Err(LookupError::InvalidHost(_))));
    }

    #[test]
    fn test_timeout_error_maps_to_timeout() {
        let err = ResolveError::from(ResolveErrorKind::Timeout);
        assert_eq!(LookupError::from(err), LookupError::Timeout);
    }

    #[tokio::test]
    async fn test_silent_nameserver_times_out() {
        // Bound but never answers.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let nameserver = NameServerConfig::new(socket.local_addr().unwrap(), Protocol::Udp);
        let config = ResolverConfig::from_parts(None, vec![], vec![nameserver]);
        let dns = HickoryDnsLookup::new(config, ResolverOpts::default(), Duration::from_millis(100));

        let started = Instant::now();
        assert_eq!(dns.resolve_a("www.example.com").await, Err(LookupError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
