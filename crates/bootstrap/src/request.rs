//! The immutable bootstrap request and its validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Namespace input for deterministic organization ids.
const ORG_ID_TEMPLATE: &str = "organization";

/// Kind of organization being provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    /// Top-level provider tenant. Gets its own subdomain.
    Provider,
    /// Partner under a provider. No portal, no subdomain required.
    Partner,
    /// Partner with its own portal and subdomain.
    PartnerPortal,
}

impl OrganizationType {
    /// Whether this type serves a portal and therefore requires a subdomain.
    pub fn requires_subdomain(&self) -> bool {
        matches!(self, Self::Provider | Self::PartnerPortal)
    }

    /// Whether this type must reference a parent organization.
    pub fn requires_parent(&self) -> bool {
        matches!(self, Self::Partner | Self::PartnerPortal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Partner => "partner",
            Self::PartnerPortal => "partner_portal",
        }
    }
}

/// A user to invite during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInvite {
    pub email: String,
    pub role: String,
}

/// Immutable input to the bootstrap saga. Created once at saga start and
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRequest {
    pub organization_name: String,
    pub organization_type: OrganizationType,
    pub parent_organization_id: Option<Uuid>,
    /// Required unless the type is a non-portal partner.
    pub subdomain: Option<String>,
    pub users: Vec<UserInvite>,
    pub trace_id: String,
}

/// Validation failures. All non-retryable; the request will never become
/// valid by waiting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("organization name must not be empty")]
    EmptyName,

    #[error("organization type '{0}' requires a subdomain")]
    MissingSubdomain(&'static str),

    #[error("organization type '{0}' requires a parent organization")]
    MissingParent(&'static str),

    #[error("invalid subdomain label: {0}")]
    InvalidSubdomain(String),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),
}

impl BootstrapRequest {
    /// Validate the request. Malformed input is rejected before any side
    /// effect happens.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.organization_name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.organization_type.requires_subdomain() && self.subdomain.is_none() {
            return Err(ValidationError::MissingSubdomain(
                self.organization_type.as_str(),
            ));
        }
        if self.organization_type.requires_parent() && self.parent_organization_id.is_none() {
            return Err(ValidationError::MissingParent(
                self.organization_type.as_str(),
            ));
        }
        if let Some(subdomain) = &self.subdomain {
            if !is_valid_label(subdomain) {
                return Err(ValidationError::InvalidSubdomain(subdomain.clone()));
            }
        }
        for user in &self.users {
            if !is_plausible_email(&user.email) {
                return Err(ValidationError::InvalidEmail(user.email.clone()));
            }
        }
        Ok(())
    }

    /// Deterministic organization id derived from the request's natural key
    /// (the subdomain where present, otherwise the name). Replays of the
    /// same request map to the same organization, and therefore to the same
    /// saga instance.
    pub fn organization_id(&self) -> Uuid {
        let natural_key = self
            .subdomain
            .as_deref()
            .unwrap_or(&self.organization_name);
        let input = format!("{}:{}", ORG_ID_TEMPLATE, natural_key.to_lowercase());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes())
    }

    /// Fully-qualified domain name for the organization's portal, if any.
    pub fn fqdn(&self, base_domain: &str) -> Option<String> {
        self.subdomain
            .as_ref()
            .map(|s| format!("{}.{}", s, base_domain))
    }
}

/// Final saga output, including partial email failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub organization_id: Uuid,
    pub fqdn: Option<String>,
    pub dns_configured: bool,
    pub invitations: Vec<crate::state::Invitation>,
    pub emails_sent: u32,
    pub email_failures: Vec<crate::state::EmailFailure>,
}

/// DNS label rules: 1-63 chars, lowercase alphanumeric or hyphen, no
/// leading/trailing hyphen.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
