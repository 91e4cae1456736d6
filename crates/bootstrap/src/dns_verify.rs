//! DNS propagation verification by resolver quorum.
//!
//! Three independent resolvers, each bound to a fixed upstream server, query
//! the domain's address records in parallel. Verification succeeds when at
//! least 2 of 3 return a non-empty, error-free answer: majority, not
//! unanimity, so one slow or unreachable resolver never blocks the saga.
//!
//! Address records are queried (not canonical names) because a proxied edge
//! network answers A records for proxied names and hides the underlying
//! canonical name.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum agreeing servers out of three.
const QUORUM: usize = 2;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// One resolver's answer for a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResult {
    pub server: String,
    pub success: bool,
    pub addresses: Vec<IpAddr>,
    pub error: Option<String>,
}

/// Aggregate verification outcome. Transient; not persisted beyond the
/// emitted verification event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsQuorumResult {
    pub server_results: Vec<ServerResult>,
    pub quorum_reached: bool,
}

impl DnsQuorumResult {
    /// Addresses resolved by any succeeding server, deduplicated.
    pub fn resolved_addresses(&self) -> Vec<IpAddr> {
        let mut addresses: Vec<IpAddr> = self
            .server_results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.addresses.iter().copied())
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }
}

/// Address-record lookup seam, stubbed in tests.
#[async_trait::async_trait]
pub trait DnsLookup: Send + Sync {
    /// Label for diagnostics (the upstream server address in production).
    fn server(&self) -> &str;

    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, String>;
}

/// Production lookup: a Tokio resolver bound to exactly one upstream server,
/// 5-second timeout, single attempt. Retrying is the caller's durable loop,
/// not the resolver's.
pub struct UpstreamResolver {
    server: String,
    resolver: TokioAsyncResolver,
}

impl UpstreamResolver {
    pub fn new(upstream: IpAddr) -> Self {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(
            SocketAddr::new(upstream, 53),
            Protocol::Udp,
        ));
        let mut opts = ResolverOpts::default();
        opts.timeout = LOOKUP_TIMEOUT;
        opts.attempts = 1;
        Self {
            server: upstream.to_string(),
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait::async_trait]
impl DnsLookup for UpstreamResolver {
    fn server(&self) -> &str {
        &self.server
    }

    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, String> {
        let ips = self
            .resolver
            .lookup_ip(domain)
            .await
            .map_err(|e| e.to_string())?;
        Ok(ips.iter().collect())
    }
}

/// Verifies propagation across three topologically-diverse resolvers.
pub struct QuorumVerifier {
    lookups: Vec<Arc<dyn DnsLookup>>,
}

impl QuorumVerifier {
    pub fn new(lookups: Vec<Arc<dyn DnsLookup>>) -> Self {
        Self { lookups }
    }

    /// Cloudflare, Google and Quad9 public resolvers.
    pub fn with_default_upstreams() -> Self {
        let upstreams: [IpAddr; 3] = [
            [1, 1, 1, 1].into(),
            [8, 8, 8, 8].into(),
            [9, 9, 9, 9].into(),
        ];
        Self::new(
            upstreams
                .into_iter()
                .map(|ip| Arc::new(UpstreamResolver::new(ip)) as Arc<dyn DnsLookup>)
                .collect(),
        )
    }

    pub fn from_upstreams(upstreams: &[IpAddr]) -> Self {
        Self::new(
            upstreams
                .iter()
                .map(|ip| Arc::new(UpstreamResolver::new(*ip)) as Arc<dyn DnsLookup>)
                .collect(),
        )
    }

    /// Query all servers concurrently and take the majority decision.
    /// Read-only; always safe to re-invoke.
    pub async fn verify(&self, domain: &str) -> DnsQuorumResult {
        let queries = self.lookups.iter().map(|lookup| async move {
            match lookup.lookup(domain).await {
                Ok(addresses) => ServerResult {
                    server: lookup.server().to_string(),
                    success: !addresses.is_empty(),
                    error: if addresses.is_empty() {
                        Some("no address records".into())
                    } else {
                        None
                    },
                    addresses,
                },
                Err(error) => ServerResult {
                    server: lookup.server().to_string(),
                    success: false,
                    addresses: Vec::new(),
                    error: Some(error),
                },
            }
        });
        let server_results = futures::future::join_all(queries).await;

        let successes = server_results.iter().filter(|r| r.success).count();
        let quorum_reached = successes >= QUORUM;
        debug!(domain, successes, quorum_reached, "dns quorum verification");
        DnsQuorumResult {
            server_results,
            quorum_reached,
        }
    }
}
