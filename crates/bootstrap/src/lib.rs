//! # tenancy-bootstrap
//!
//! Crash-tolerant organization bootstrap: create the organization, configure
//! and verify its DNS subdomain, invite its initial users, and activate the
//! tenant, or compensate everything in reverse if a step fails for good.
//!
//! The orchestration runs on the `tenancy-saga` substrate: every completed
//! step is checkpointed before the saga advances, waits go through durable
//! timers, and a restarted process resumes from the log without repeating
//! side effects. Activities are additionally check-then-act idempotent, so
//! at-least-once execution never duplicates organizations, DNS records,
//! invitations or emails.
//!
//! ## Modules
//!
//! - [`request`]: the immutable [`BootstrapRequest`] and its validation
//! - [`state`]: [`BootstrapStep`] state machine and [`WorkflowState`]
//! - [`emitter`]: the idempotent domain-event emitter
//! - [`projection`]: read-side lookups for check-then-act
//! - [`providers`]: DNS and email provider ports with three adapter tiers
//! - [`dns_verify`]: the 2-of-3 resolver quorum verifier
//! - [`activities`]: forward activities and compensations
//! - [`orchestrator`]: [`BootstrapSaga`], the saga itself
//! - [`status`]: read-only progress surface over the checkpoint log
//! - [`config`]: typed configuration, [`wiring`]: adapter construction
//! - [`telemetry`]: tracing subscriber init

pub mod activities;
pub mod config;
pub mod dns_verify;
pub mod emitter;
pub mod orchestrator;
pub mod projection;
pub mod providers;
pub mod request;
pub mod state;
pub mod status;
pub mod telemetry;
pub mod wiring;

pub use activities::BootstrapActivities;
pub use config::{BootstrapConfig, ProviderTier};
pub use dns_verify::{DnsQuorumResult, QuorumVerifier, ServerResult};
pub use emitter::{DomainEvent, EventLog, IdempotentEmitter, InMemoryEventLog};
pub use orchestrator::{BootstrapError, BootstrapSaga};
pub use projection::{InMemoryProjection, ReadProjection};
pub use request::{BootstrapRequest, BootstrapResult, OrganizationType, UserInvite};
pub use state::{BootstrapStep, EmailFailure, Invitation, WorkflowState};
pub use status::{BootstrapProgress, BootstrapStatus, StatusReader};
