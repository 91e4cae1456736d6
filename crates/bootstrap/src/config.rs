//! Typed configuration.
//!
//! Values come from the environment (prefix `BOOTSTRAP`, `__` as the nesting
//! separator) layered over defaults, with `.env` files honoured for local
//! development. All consumption is through [`BootstrapConfig`]; nothing
//! reads the environment at call sites.

use std::net::IpAddr;
use std::time::Duration;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which adapter implements a provider port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    /// Real HTTP API client. Requires endpoint and token.
    Api,
    /// In-memory deterministic mock.
    Mock,
    /// Log-only; every call succeeds with synthetic ids.
    Logging,
}

#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(#[from] config::ConfigError);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Base domain portals live under (`acme.<base_domain>`).
    pub base_domain: String,
    /// Address the portal record points at.
    pub dns_target: String,
    pub email_from: String,

    pub propagation_wait_secs: u64,
    pub verify_attempts: u32,
    pub saga_deadline_secs: u64,

    pub dns_tier: ProviderTier,
    pub email_tier: ProviderTier,

    pub dns_api_url: String,
    pub dns_api_token: String,
    pub email_api_url: String,
    pub email_api_token: String,

    /// Fixed upstream resolvers for propagation verification.
    pub resolver_upstreams: Vec<IpAddr>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            base_domain: "example-platform.com".into(),
            dns_target: "203.0.113.10".into(),
            email_from: "noreply@example-platform.com".into(),
            propagation_wait_secs: 300,
            verify_attempts: 6,
            saga_deadline_secs: 3600,
            dns_tier: ProviderTier::Logging,
            email_tier: ProviderTier::Logging,
            dns_api_url: String::new(),
            dns_api_token: String::new(),
            email_api_url: String::new(),
            email_api_token: String::new(),
            resolver_upstreams: vec![
                [1, 1, 1, 1].into(),
                [8, 8, 8, 8].into(),
                [9, 9, 9, 9].into(),
            ],
        }
    }
}

impl BootstrapConfig {
    /// Load from the environment over defaults. `.env` is read first if
    /// present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(Environment::with_prefix("BOOTSTRAP").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn propagation_wait(&self) -> Duration {
        Duration::from_secs(self.propagation_wait_secs)
    }

    pub fn saga_deadline(&self) -> Duration {
        Duration::from_secs(self.saga_deadline_secs)
    }
}
