//! Read-side projection port for check-then-act lookups.
//!
//! The projection is eventually consistent with a bounded lag: a resource
//! created moments ago may not be visible yet. Activities treat "not found
//! right after creation" as non-fatal and rely on deterministic ids plus
//! event dedup to absorb the replay.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tenancy_saga::ActivityError;
use thiserror::Error;
use uuid::Uuid;

use crate::request::OrganizationType;
use crate::state::Invitation;

/// A projected organization row.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationRecord {
    pub organization_id: Uuid,
    pub name: String,
    pub organization_type: OrganizationType,
    pub subdomain: Option<String>,
    pub active: bool,
}

/// A projected contact/address/phone row owned by an organization.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    pub record_id: Uuid,
    pub organization_id: Uuid,
    pub kind: String,
}

/// Projection read failures are transient by definition; the projected data
/// itself never rejects a read.
#[derive(Debug, Error)]
#[error("projection unavailable: {0}")]
pub struct ProjectionError(pub String);

impl From<ProjectionError> for ActivityError {
    fn from(err: ProjectionError) -> Self {
        ActivityError::retryable(err.to_string())
    }
}

/// Point lookups by natural key.
#[async_trait::async_trait]
pub trait ReadProjection: Send + Sync {
    async fn find_organization_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<OrganizationRecord>, ProjectionError>;

    async fn find_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<OrganizationRecord>, ProjectionError>;

    /// Pending, non-expired invitation for `(organization, email)`.
    async fn find_pending_invitation(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, ProjectionError>;

    /// All contact-style rows owned by the organization.
    async fn contact_records(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<ContactRecord>, ProjectionError>;
}

/// In-memory projection, seedable from tests and the mock tier.
#[derive(Default)]
pub struct InMemoryProjection {
    organizations: RwLock<HashMap<Uuid, OrganizationRecord>>,
    invitations: RwLock<Vec<(Uuid, Invitation)>>,
    contacts: RwLock<Vec<ContactRecord>>,
}

impl InMemoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_organization(&self, record: OrganizationRecord) {
        self.organizations
            .write()
            .insert(record.organization_id, record);
    }

    pub fn insert_invitation(&self, organization_id: Uuid, invitation: Invitation) {
        self.invitations.write().push((organization_id, invitation));
    }

    pub fn insert_contact_record(&self, record: ContactRecord) {
        self.contacts.write().push(record);
    }
}

#[async_trait::async_trait]
impl ReadProjection for InMemoryProjection {
    async fn find_organization_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<OrganizationRecord>, ProjectionError> {
        Ok(self
            .organizations
            .read()
            .values()
            .find(|o| o.subdomain.as_deref() == Some(subdomain))
            .cloned())
    }

    async fn find_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<OrganizationRecord>, ProjectionError> {
        Ok(self.organizations.read().get(&organization_id).cloned())
    }

    async fn find_pending_invitation(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, ProjectionError> {
        let now = Utc::now();
        Ok(self
            .invitations
            .read()
            .iter()
            .find(|(org, inv)| {
                *org == organization_id && inv.email == email && !inv.is_expired(now)
            })
            .map(|(_, inv)| inv.clone()))
    }

    async fn contact_records(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<ContactRecord>, ProjectionError> {
        Ok(self
            .contacts
            .read()
            .iter()
            .filter(|c| c.organization_id == organization_id)
            .cloned()
            .collect())
    }
}
