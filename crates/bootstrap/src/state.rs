//! Workflow state and the bootstrap step machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position in the bootstrap state machine. Linear happy path with a
/// compensating branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStep {
    Started,
    OrgCreating,
    OrgCreated,
    PermissionsGranting,
    DnsConfiguring,
    DnsConfigured,
    AwaitingPropagation,
    DnsVerifying,
    DnsVerified,
    InvitationsGenerating,
    EmailsSending,
    Completing,
    Completed,
    Compensating,
    Failed,
}

impl BootstrapStep {
    /// The happy-path sequence, in execution order. `Compensating` and
    /// `Failed` branch off and are not part of it.
    pub fn sequence() -> &'static [BootstrapStep] {
        &[
            Self::Started,
            Self::OrgCreating,
            Self::OrgCreated,
            Self::PermissionsGranting,
            Self::DnsConfiguring,
            Self::DnsConfigured,
            Self::AwaitingPropagation,
            Self::DnsVerifying,
            Self::DnsVerified,
            Self::InvitationsGenerating,
            Self::EmailsSending,
            Self::Completing,
            Self::Completed,
        ]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::OrgCreating => "org_creating",
            Self::OrgCreated => "org_created",
            Self::PermissionsGranting => "permissions_granting",
            Self::DnsConfiguring => "dns_configuring",
            Self::DnsConfigured => "dns_configured",
            Self::AwaitingPropagation => "awaiting_propagation",
            Self::DnsVerifying => "dns_verifying",
            Self::DnsVerified => "dns_verified",
            Self::InvitationsGenerating => "invitations_generating",
            Self::EmailsSending => "emails_sending",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Compensating => "compensating",
            Self::Failed => "failed",
        }
    }
}

/// An issued invitation. The token is reused if a non-expired pending
/// invitation for the same `(organization, email)` already exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A per-recipient email failure. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailFailure {
    pub email: String,
    pub error: String,
}

/// Orchestrator-local durable checkpoint record. Mutated only by the
/// orchestrator, once per step; completion flags only flip false to true.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub organization_id: Option<Uuid>,
    pub dns_zone_id: Option<String>,
    pub dns_record_id: Option<String>,
    pub fqdn: Option<String>,
    pub invitations: Vec<Invitation>,

    pub organization_created: bool,
    pub permissions_granted: bool,
    pub dns_configured: bool,
    pub dns_verified: bool,
    pub invitations_generated: bool,
    pub emails_sent: bool,

    pub emails_sent_count: u32,
    pub email_failures: Vec<EmailFailure>,
    pub compensation_errors: Vec<String>,
}
