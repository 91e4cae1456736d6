//! Adapter construction.
//!
//! The tier decision happens exactly once, here, from typed configuration.
//! The event log and read projection are consumed ports owned by the
//! embedding application, so they are passed in rather than built.

use std::sync::Arc;

use crate::activities::BootstrapActivities;
use crate::config::{BootstrapConfig, ProviderTier};
use crate::dns_verify::QuorumVerifier;
use crate::emitter::{EventLog, IdempotentEmitter};
use crate::orchestrator::SagaTuning;
use crate::projection::ReadProjection;
use crate::providers::{
    ApiDnsProvider, ApiEmailProvider, DnsProvider, EmailProvider, LoggingDnsProvider,
    LoggingEmailProvider, MockDnsProvider, MockEmailProvider,
};

pub fn build_dns_provider(config: &BootstrapConfig) -> Arc<dyn DnsProvider> {
    match config.dns_tier {
        ProviderTier::Api => Arc::new(ApiDnsProvider::new(
            config.dns_api_url.clone(),
            config.dns_api_token.clone(),
        )),
        ProviderTier::Mock => {
            Arc::new(MockDnsProvider::new().with_zone("zone-mock", &config.base_domain))
        }
        ProviderTier::Logging => Arc::new(LoggingDnsProvider),
    }
}

pub fn build_email_provider(config: &BootstrapConfig) -> Arc<dyn EmailProvider> {
    match config.email_tier {
        ProviderTier::Api => Arc::new(ApiEmailProvider::new(
            config.email_api_url.clone(),
            config.email_api_token.clone(),
        )),
        ProviderTier::Mock => Arc::new(MockEmailProvider::new()),
        ProviderTier::Logging => Arc::new(LoggingEmailProvider),
    }
}

/// Assemble the activity layer with the configured adapter tiers.
pub fn build_activities(
    config: &BootstrapConfig,
    log: Arc<dyn EventLog>,
    projection: Arc<dyn ReadProjection>,
) -> Arc<BootstrapActivities> {
    let verifier = Arc::new(QuorumVerifier::from_upstreams(&config.resolver_upstreams));
    Arc::new(BootstrapActivities::new(
        build_dns_provider(config),
        build_email_provider(config),
        projection,
        IdempotentEmitter::new(log),
        verifier,
        config.base_domain.clone(),
        config.dns_target.clone(),
        config.email_from.clone(),
    ))
}

/// Saga tuning derived from configuration.
pub fn build_tuning(config: &BootstrapConfig) -> SagaTuning {
    SagaTuning {
        propagation_wait: config.propagation_wait(),
        verify_attempts: config.verify_attempts,
        saga_deadline: config.saga_deadline(),
        ..SagaTuning::default()
    }
}
