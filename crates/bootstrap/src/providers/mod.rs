//! External provider ports (DNS, email) and their adapter tiers.
//!
//! Each port has three implementations: a production reqwest client, an
//! in-memory deterministic mock with failure injection, and a logging-only
//! adapter for local runs without credentials. Which tier is used is decided
//! once, in [`crate::wiring`], never at call sites.

pub mod dns;
pub mod email;

use tenancy_saga::ActivityError;
use thiserror::Error;

pub use dns::{
    ApiDnsProvider, CreateRecordParams, DnsProvider, DnsRecord, LoggingDnsProvider,
    MockDnsProvider, RecordFilter, Zone,
};
pub use email::{
    ApiEmailProvider, EmailMessage, EmailProvider, LoggingEmailProvider, MockEmailProvider,
    SendReport,
};

/// Provider API failures, classified for retry.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials rejected. Retrying cannot help.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transport-level failure (timeout, connection refused, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The provider rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other API-level error, classified by status code.
    #[error("provider api error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Network(_) => true,
            Self::Auth(_) | Self::InvalidRequest(_) | Self::NotFound(_) => false,
            Self::Api { status, .. } => *status >= 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                Self::Auth(err.to_string())
            }
            Some(status) if status.as_u16() == 429 => Self::RateLimited(err.to_string()),
            Some(status) if status.as_u16() == 404 => Self::NotFound(err.to_string()),
            Some(status) => Self::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<ProviderError> for ActivityError {
    fn from(err: ProviderError) -> Self {
        if err.is_retryable() {
            ActivityError::retryable(err.to_string())
        } else {
            ActivityError::permanent(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ProviderError::RateLimited("slow down".into()).is_retryable());
        assert!(ProviderError::Network("timeout".into()).is_retryable());
        assert!(ProviderError::Api { status: 503, message: "".into() }.is_retryable());

        assert!(!ProviderError::Auth("bad token".into()).is_retryable());
        assert!(!ProviderError::InvalidRequest("bad zone".into()).is_retryable());
        assert!(!ProviderError::Api { status: 422, message: "".into() }.is_retryable());
    }
}
