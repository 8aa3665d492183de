//! Host resolution through the system resolver.

use async_trait::async_trait;
use std::net::IpAddr;

use super::HostResolver;

/// Resolves hostnames with `tokio::net::lookup_host`, keeping the first IPv4 answer.
#[derive(Debug, Clone, Default)]
pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, host: &str) -> Option<String> {
        let addrs = match tokio::net::lookup_host((host, 0)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!("DNS resolution failed for {}: {}", host, e);
                return None;
            }
        };

        let ip = addrs
            .map(|sa| sa.ip())
            .find(IpAddr::is_ipv4)
            .map(|ip| ip.to_string());

        if ip.is_none() {
            tracing::warn!("No IPv4 address found for {}", host);
        }
        ip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal() {
        let resolver = DnsResolver;
        assert_eq!(resolver.resolve("127.0.0.1").await.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let resolver = DnsResolver;
        assert!(resolver.resolve("does-not-exist.invalid").await.is_none());
    }
}
