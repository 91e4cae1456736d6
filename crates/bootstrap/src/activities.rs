//! Forward activities and compensations.
//!
//! Every forward activity is check-then-act idempotent: look the resource up
//! by its natural key, reuse it when the configuration matches, fail
//! non-retryably when it conflicts, create it when absent. Re-executing any
//! activity after a crash or retry therefore never duplicates a side effect.
//!
//! Compensations are equally idempotent and treat "nothing to undo" as
//! success.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tenancy_saga::{ActivityError, RetryPolicy};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dns_verify::{DnsQuorumResult, QuorumVerifier};
use crate::emitter::IdempotentEmitter;
use crate::projection::ReadProjection;
use crate::providers::{
    CreateRecordParams, DnsProvider, EmailMessage, EmailProvider, RecordFilter,
};
use crate::request::BootstrapRequest;
use crate::state::{EmailFailure, Invitation};

const INVITATION_TTL_DAYS: i64 = 7;
const INVITATION_TOKEN_LEN: usize = 48;
const DNS_RECORD_TTL: u32 = 300;

/// Output of organization creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrganizationOutput {
    pub organization_id: Uuid,
    /// False when an exactly-matching organization already existed.
    pub created: bool,
}

/// Output of DNS configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureDnsOutput {
    pub zone_id: String,
    pub record_id: String,
    pub fqdn: String,
    pub created: bool,
}

/// Output of invitation generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateInvitationsOutput {
    pub invitations: Vec<Invitation>,
}

/// Output of the email step. Partial failure is data, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEmailsOutput {
    pub sent: u32,
    pub failures: Vec<EmailFailure>,
}

/// The activity layer: every side-effecting operation the saga performs,
/// with its provider and store dependencies injected.
pub struct BootstrapActivities {
    dns: Arc<dyn DnsProvider>,
    email: Arc<dyn EmailProvider>,
    projection: Arc<dyn ReadProjection>,
    emitter: IdempotentEmitter,
    verifier: Arc<QuorumVerifier>,
    base_domain: String,
    dns_target: String,
    email_from: String,
}

impl BootstrapActivities {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dns: Arc<dyn DnsProvider>,
        email: Arc<dyn EmailProvider>,
        projection: Arc<dyn ReadProjection>,
        emitter: IdempotentEmitter,
        verifier: Arc<QuorumVerifier>,
        base_domain: impl Into<String>,
        dns_target: impl Into<String>,
        email_from: impl Into<String>,
    ) -> Self {
        Self {
            dns,
            email,
            projection,
            emitter,
            verifier,
            base_domain: base_domain.into(),
            dns_target: dns_target.into(),
            email_from: email_from.into(),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Create the organization aggregate, or adopt an existing one.
    ///
    /// Natural key: the subdomain. An existing organization with the same
    /// subdomain but different name or type is a configuration conflict. A
    /// just-created organization may not be projected yet; the deterministic
    /// event id absorbs the repeated emit.
    pub async fn create_organization(
        &self,
        request: &BootstrapRequest,
    ) -> Result<CreateOrganizationOutput, ActivityError> {
        if let Some(subdomain) = &request.subdomain {
            if let Some(existing) = self
                .projection
                .find_organization_by_subdomain(subdomain)
                .await?
            {
                if existing.name == request.organization_name
                    && existing.organization_type == request.organization_type
                {
                    info!(organization_id = %existing.organization_id, subdomain, "organization already exists, adopting");
                    return Ok(CreateOrganizationOutput {
                        organization_id: existing.organization_id,
                        created: false,
                    });
                }
                return Err(ActivityError::permanent(format!(
                    "subdomain '{}' is already bound to organization '{}' ({})",
                    subdomain,
                    existing.name,
                    existing.organization_type.as_str()
                )));
            }
        }

        let organization_id = request.organization_id();
        self.emitter
            .emit(
                &organization_id.to_string(),
                "organization",
                "organization.created",
                json!({
                    "organization_id": organization_id,
                    "name": request.organization_name,
                    "organization_type": request.organization_type.as_str(),
                    "subdomain": request.subdomain,
                    "parent_organization_id": request.parent_organization_id,
                }),
                json!({ "trace_id": request.trace_id }),
            )
            .await?;
        info!(%organization_id, "organization created");
        Ok(CreateOrganizationOutput {
            organization_id,
            created: true,
        })
    }

    /// Grant the inviting users' roles on the new organization. Deduped by
    /// organization id and role set.
    pub async fn grant_admin_permissions(
        &self,
        request: &BootstrapRequest,
        organization_id: Uuid,
    ) -> Result<(), ActivityError> {
        let roles: BTreeSet<&str> = request.users.iter().map(|u| u.role.as_str()).collect();
        self.emitter
            .emit(
                &organization_id.to_string(),
                "organization",
                "organization.permissions_granted",
                json!({
                    "organization_id": organization_id,
                    "roles": roles,
                }),
                json!({ "trace_id": request.trace_id }),
            )
            .await?;
        Ok(())
    }

    /// Configure the portal's address record, or adopt an existing matching
    /// one. Natural key: `(fqdn, record type)` within the base domain's zone.
    pub async fn configure_dns(
        &self,
        request: &BootstrapRequest,
        fqdn: &str,
    ) -> Result<ConfigureDnsOutput, ActivityError> {
        let zones = self.dns.list_zones(&self.base_domain).await?;
        let zone = zones.first().ok_or_else(|| {
            ActivityError::permanent(format!("no DNS zone found for '{}'", self.base_domain))
        })?;

        let filter = RecordFilter {
            name: fqdn.to_string(),
            record_type: "A".to_string(),
        };
        let existing = self.dns.list_records(&zone.zone_id, &filter).await?;
        if let Some(record) = existing.first() {
            if record.content != self.dns_target {
                return Err(ActivityError::permanent(format!(
                    "DNS record for '{}' already points at '{}', expected '{}'",
                    fqdn, record.content, self.dns_target
                )));
            }
            info!(fqdn, record_id = %record.record_id, "dns record already present, adopting");
            return Ok(ConfigureDnsOutput {
                zone_id: zone.zone_id.clone(),
                record_id: record.record_id.clone(),
                fqdn: fqdn.to_string(),
                created: false,
            });
        }

        let record = self
            .dns
            .create_record(
                &zone.zone_id,
                &CreateRecordParams {
                    name: fqdn.to_string(),
                    record_type: "A".to_string(),
                    content: self.dns_target.clone(),
                    ttl: DNS_RECORD_TTL,
                    proxied: true,
                },
            )
            .await?;
        self.emitter
            .emit(
                &request.organization_id().to_string(),
                "organization",
                "organization.dns_configured",
                json!({ "fqdn": fqdn, "record_id": record.record_id }),
                json!({ "trace_id": request.trace_id }),
            )
            .await?;
        info!(fqdn, record_id = %record.record_id, "dns record created");
        Ok(ConfigureDnsOutput {
            zone_id: zone.zone_id.clone(),
            record_id: record.record_id,
            fqdn: fqdn.to_string(),
            created: true,
        })
    }

    /// One propagation check. No quorum is a retryable condition (expected,
    /// not exceptional); the orchestrator owns the poll budget.
    pub async fn verify_dns(&self, fqdn: &str) -> Result<DnsQuorumResult, ActivityError> {
        let result = self.verifier.verify(fqdn).await;
        if !result.quorum_reached {
            let detail = result
                .server_results
                .iter()
                .map(|r| format!("{}={}", r.server, if r.success { "ok" } else { "fail" }))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ActivityError::retryable(format!(
                "DNS for '{fqdn}' not yet propagated ({detail})"
            )));
        }
        Ok(result)
    }

    /// Issue invitations, reusing any pending non-expired invitation for the
    /// same `(organization, email)` pair.
    pub async fn generate_invitations(
        &self,
        request: &BootstrapRequest,
        organization_id: Uuid,
    ) -> Result<GenerateInvitationsOutput, ActivityError> {
        let mut invitations = Vec::with_capacity(request.users.len());
        for user in &request.users {
            let invitation = match self
                .projection
                .find_pending_invitation(organization_id, &user.email)
                .await?
            {
                Some(existing) => {
                    info!(email = %user.email, "pending invitation exists, reusing token");
                    existing
                }
                None => Invitation {
                    invitation_id: invitation_id_for(organization_id, &user.email),
                    email: user.email.clone(),
                    token: generate_token(),
                    expires_at: Utc::now() + chrono::Duration::days(INVITATION_TTL_DAYS),
                },
            };

            // The dedup key covers the invitation identity only; the token
            // is fresh per execution and must not participate.
            self.emitter
                .emit(
                    &organization_id.to_string(),
                    "organization",
                    "invitation.created",
                    json!({
                        "invitation_id": invitation.invitation_id,
                        "email": invitation.email,
                    }),
                    json!({
                        "trace_id": request.trace_id,
                        "token": invitation.token,
                        "expires_at": invitation.expires_at,
                    }),
                )
                .await?;
            invitations.push(invitation);
        }
        Ok(GenerateInvitationsOutput { invitations })
    }

    /// Send invitation emails. Each recipient is attempted independently
    /// with a small retry budget; failures are recorded and never abort the
    /// saga.
    pub async fn send_invitation_emails(
        &self,
        request: &BootstrapRequest,
        invitations: &[Invitation],
        fqdn: Option<&str>,
    ) -> Result<SendEmailsOutput, ActivityError> {
        let policy = RetryPolicy::email();
        let portal = fqdn.unwrap_or(&self.base_domain);
        let mut sent = 0u32;
        let mut failures = Vec::new();

        for invitation in invitations {
            let message = invitation_message(&self.email_from, invitation, portal, request);
            match self.send_one(&message, &policy).await {
                Ok(()) => sent += 1,
                Err(error) => {
                    warn!(email = %invitation.email, %error, "invitation email failed");
                    failures.push(EmailFailure {
                        email: invitation.email.clone(),
                        error,
                    });
                }
            }
        }
        Ok(SendEmailsOutput { sent, failures })
    }

    async fn send_one(&self, message: &EmailMessage, policy: &RetryPolicy) -> Result<(), String> {
        let mut attempt = 0u32;
        loop {
            match self.email.send(message).await {
                Ok(report) if report.rejected.is_empty() => return Ok(()),
                Ok(report) => {
                    // Provider-side rejection is final for this address.
                    return Err(format!("recipient rejected: {}", report.rejected.join(", ")));
                }
                Err(err) if err.is_retryable() => match policy.delay_for(attempt) {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err.to_string()),
                },
                Err(err) => return Err(err.to_string()),
            }
        }
    }

    /// Activate the tenant: emit the completion event that downstream
    /// consumers act on.
    pub async fn complete_bootstrap(
        &self,
        request: &BootstrapRequest,
        organization_id: Uuid,
        fqdn: Option<&str>,
        emails_sent: u32,
        email_failures: &[EmailFailure],
    ) -> Result<(), ActivityError> {
        self.emitter
            .emit(
                &organization_id.to_string(),
                "organization",
                "organization.bootstrap_completed",
                json!({
                    "organization_id": organization_id,
                    "fqdn": fqdn,
                    "emails_sent": emails_sent,
                    "email_failures": email_failures.len(),
                }),
                json!({ "trace_id": request.trace_id }),
            )
            .await?;
        info!(%organization_id, "bootstrap completed");
        Ok(())
    }

    // Compensations.

    /// Remove the DNS record created by this saga. An already-absent record
    /// is success, not an error.
    pub async fn remove_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
    ) -> Result<(), ActivityError> {
        match self.dns.delete_record(zone_id, record_id).await {
            Ok(()) => {
                info!(zone_id, record_id, "dns record removed");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                info!(zone_id, record_id, "dns record already absent");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Revoke every invitation this saga issued.
    pub async fn revoke_invitations(
        &self,
        request: &BootstrapRequest,
        organization_id: Uuid,
        invitations: &[Invitation],
    ) -> Result<(), ActivityError> {
        for invitation in invitations {
            self.emitter
                .emit(
                    &organization_id.to_string(),
                    "organization",
                    "invitation.revoked",
                    json!({
                        "invitation_id": invitation.invitation_id,
                        "email": invitation.email,
                    }),
                    json!({ "trace_id": request.trace_id }),
                )
                .await?;
        }
        Ok(())
    }

    /// Delete the contact/address/phone rows projected for the organization.
    pub async fn delete_contact_records(
        &self,
        request: &BootstrapRequest,
        organization_id: Uuid,
    ) -> Result<(), ActivityError> {
        let records = self.projection.contact_records(organization_id).await?;
        if records.is_empty() {
            return Ok(());
        }
        let mut record_ids: Vec<Uuid> = records.iter().map(|r| r.record_id).collect();
        record_ids.sort();
        self.emitter
            .emit(
                &organization_id.to_string(),
                "organization",
                "organization.contact_records_deleted",
                json!({
                    "organization_id": organization_id,
                    "record_ids": record_ids,
                }),
                json!({ "trace_id": request.trace_id }),
            )
            .await?;
        Ok(())
    }

    /// Announce the failed bootstrap. The event's consumer deactivates the
    /// organization; this is the single deactivation mechanism.
    pub async fn emit_bootstrap_failed(
        &self,
        request: &BootstrapRequest,
        organization_id: Uuid,
        error: &str,
    ) -> Result<(), ActivityError> {
        self.emitter
            .emit(
                &organization_id.to_string(),
                "organization",
                "organization.bootstrap_failed",
                json!({
                    "organization_id": organization_id,
                    "error": error,
                }),
                json!({ "trace_id": request.trace_id }),
            )
            .await?;
        warn!(%organization_id, error, "bootstrap failed event emitted");
        Ok(())
    }
}

/// Deterministic invitation identity for `(organization, email)`.
fn invitation_id_for(organization_id: Uuid, email: &str) -> Uuid {
    let input = format!("invitation:{organization_id}:{}", email.to_lowercase());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes())
}

/// 48 characters of OS-sourced alphanumeric entropy.
fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INVITATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn invitation_message(
    from: &str,
    invitation: &Invitation,
    portal: &str,
    request: &BootstrapRequest,
) -> EmailMessage {
    let link = format!("https://{}/invite/{}", portal, invitation.token);
    EmailMessage {
        from: from.to_string(),
        to: vec![invitation.email.clone()],
        subject: format!("You're invited to {}", request.organization_name),
        html: format!(
            "<p>You have been invited to <b>{}</b>.</p><p><a href=\"{link}\">Accept invitation</a></p>",
            request.organization_name
        ),
        text: format!(
            "You have been invited to {}. Accept: {link}",
            request.organization_name
        ),
    }
}
