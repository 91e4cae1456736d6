//! The bootstrap saga orchestrator.
//!
//! A single logical thread of control: validate, create the organization,
//! grant permissions, configure DNS, wait out propagation on a durable
//! timer, verify by resolver quorum, issue invitations, send emails,
//! activate. Every completed step is checkpointed; on a compensable failure
//! the completed steps are undone in reverse order and the original error is
//! surfaced together with the compensation summary.
//!
//! The orchestrator reads no wall clock, randomness or environment directly.
//! Time and entropy live in the activities and the timer store; elapsed time
//! is measured from the durable start checkpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tenancy_saga::{
    EventStore, RetryPolicy, SagaError, SagaId, SagaRun, SagaRunConfig, TimerStatus, TimerStore,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::activities::BootstrapActivities;
use crate::dns_verify::DnsQuorumResult;
use crate::request::{BootstrapRequest, BootstrapResult, ValidationError};
use crate::state::WorkflowState;

/// Step names as recorded in the checkpoint log.
pub mod steps {
    pub const CREATE_ORGANIZATION: &str = "create-organization";
    pub const GRANT_PERMISSIONS: &str = "grant-admin-permissions";
    pub const CONFIGURE_DNS: &str = "configure-dns";
    pub const GENERATE_INVITATIONS: &str = "generate-invitations";
    pub const SEND_EMAILS: &str = "send-invitation-emails";
    pub const COMPLETE_BOOTSTRAP: &str = "complete-bootstrap";

    pub const REVOKE_INVITATIONS: &str = "revoke-invitations";
    pub const REMOVE_DNS_RECORD: &str = "remove-dns-record";
    pub const DELETE_CONTACT_RECORDS: &str = "delete-contact-records";
    pub const EMIT_BOOTSTRAP_FAILED: &str = "emit-bootstrap-failed";

    /// Per-attempt verification step name; each poll attempt is its own
    /// checkpoint so replay never returns a stale verdict.
    pub fn verify_dns(attempt: u32) -> String {
        format!("verify-dns-{attempt}")
    }

    /// Per-attempt propagation timer key.
    pub fn propagation_timer(attempt: u32) -> String {
        format!("dns-propagation-{attempt}")
    }
}

/// Durations and budgets for one saga. Tests shrink these.
#[derive(Debug, Clone)]
pub struct SagaTuning {
    /// Durable wait between DNS configuration and each verification attempt.
    pub propagation_wait: Duration,
    /// Verification poll budget.
    pub verify_attempts: u32,
    /// Hard ceiling for the whole saga.
    pub saga_deadline: Duration,
    pub run: SagaRunConfig,
}

impl Default for SagaTuning {
    fn default() -> Self {
        Self {
            propagation_wait: Duration::from_secs(300),
            verify_attempts: 6,
            saga_deadline: Duration::from_secs(3600),
            run: SagaRunConfig::default(),
        }
    }
}

/// Terminal orchestration errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    /// A saga for this organization is already active.
    #[error("bootstrap already running for organization saga {0}")]
    AlreadyRunning(SagaId),

    /// This organization's bootstrap already reached a terminal state.
    #[error("bootstrap already finished for organization saga {0}")]
    AlreadyFinished(SagaId),

    /// The saga failed and was compensated. Carries the original error and
    /// the compensation summary; compensation problems never mask the
    /// trigger.
    #[error("bootstrap failed: {error}")]
    Failed {
        error: String,
        compensation_errors: Vec<String>,
    },

    #[error(transparent)]
    Saga(SagaError),
}

/// The organization bootstrap saga.
pub struct BootstrapSaga<S, W>
where
    S: EventStore,
    W: TimerStore,
{
    activities: Arc<BootstrapActivities>,
    event_store: Arc<S>,
    timer_store: Arc<W>,
    tuning: SagaTuning,
}

impl<S, W> BootstrapSaga<S, W>
where
    S: EventStore,
    W: TimerStore,
{
    pub fn new(
        activities: Arc<BootstrapActivities>,
        event_store: Arc<S>,
        timer_store: Arc<W>,
        tuning: SagaTuning,
    ) -> Self {
        Self {
            activities,
            event_store,
            timer_store,
            tuning,
        }
    }

    /// The saga instance key for a request.
    pub fn saga_id_for(request: &BootstrapRequest) -> SagaId {
        SagaId::for_organization(request.organization_id())
    }

    /// Start a fresh bootstrap. A concurrent duplicate start for the same
    /// organization is rejected by the instance key plus the store's
    /// optimistic lock.
    #[instrument(skip_all, fields(organization = %request.organization_name, trace_id = %request.trace_id))]
    pub async fn run(&self, request: &BootstrapRequest) -> Result<BootstrapResult, BootstrapError> {
        request.validate()?;
        let saga_id = Self::saga_id_for(request);
        let input = serde_json::to_value(request)
            .map_err(|e| BootstrapError::Saga(SagaError::Codec(e.to_string())))?;
        let run = SagaRun::start(
            self.event_store.clone(),
            self.timer_store.clone(),
            self.tuning.run.clone(),
            saga_id,
            input,
        )
        .await
        .map_err(map_lifecycle)?;
        self.execute(run, request).await
    }

    /// Resume an interrupted bootstrap after a process restart. Completed
    /// steps are replayed from the checkpoint log, not re-executed.
    #[instrument(skip_all, fields(organization = %request.organization_name, trace_id = %request.trace_id))]
    pub async fn resume(
        &self,
        request: &BootstrapRequest,
    ) -> Result<BootstrapResult, BootstrapError> {
        request.validate()?;
        let saga_id = Self::saga_id_for(request);
        let run = SagaRun::resume(
            self.event_store.clone(),
            self.timer_store.clone(),
            self.tuning.run.clone(),
            saga_id,
        )
        .await
        .map_err(map_lifecycle)?;
        self.execute(run, request).await
    }

    /// Short-circuit the current DNS-propagation wait, if one is pending.
    /// Returns whether a timer was cancelled. The waiting saga observes the
    /// cancellation as an early, durably-recorded fire, so determinism is
    /// preserved.
    pub async fn retry_now(&self, saga_id: &SagaId) -> Result<bool, BootstrapError> {
        let timers = self
            .timer_store
            .get_timers_for_saga(saga_id)
            .await
            .map_err(|e| BootstrapError::Saga(SagaError::TimerStore(e.to_string())))?;
        for timer in timers {
            if timer.status == TimerStatus::Pending
                && timer.timer_key.starts_with("dns-propagation-")
            {
                self.timer_store
                    .cancel_timer(&timer.timer_id)
                    .await
                    .map_err(|e| BootstrapError::Saga(SagaError::TimerStore(e.to_string())))?;
                info!(saga_id = %saga_id, timer_key = %timer.timer_key, "propagation wait short-circuited");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn execute(
        &self,
        mut run: SagaRun<S, W>,
        request: &BootstrapRequest,
    ) -> Result<BootstrapResult, BootstrapError> {
        let mut state = WorkflowState::default();
        match self.forward(&mut run, request, &mut state).await {
            Ok(result) => {
                run.complete(json!({
                    "organization_id": result.organization_id,
                    "fqdn": result.fqdn,
                    "emails_sent": result.emails_sent,
                    "email_failures": result.email_failures.len(),
                }))
                .await
                .map_err(BootstrapError::Saga)?;
                Ok(result)
            }
            Err(error) if error.is_compensable() => {
                warn!(%error, "bootstrap failed, compensating");
                self.compensate(&mut run, request, &mut state, &error).await;
                let compensation_errors = state.compensation_errors.clone();
                run.fail(&error.to_string(), &compensation_errors)
                    .await
                    .map_err(BootstrapError::Saga)?;
                Err(BootstrapError::Failed {
                    error: error.to_string(),
                    compensation_errors,
                })
            }
            Err(error) => Err(map_lifecycle(error)),
        }
    }

    async fn forward(
        &self,
        run: &mut SagaRun<S, W>,
        request: &BootstrapRequest,
        state: &mut WorkflowState,
    ) -> Result<BootstrapResult, SagaError> {
        let deadline = self.tuning.saga_deadline;
        state.fqdn = request.fqdn(self.activities.base_domain());

        run.check_deadline(deadline)?;
        let org = run
            .step(steps::CREATE_ORGANIZATION, RetryPolicy::fast_db(), || {
                self.activities.create_organization(request)
            })
            .await?;
        state.organization_id = Some(org.organization_id);
        state.organization_created = true;

        run.check_deadline(deadline)?;
        run.step(steps::GRANT_PERMISSIONS, RetryPolicy::fast_db(), || {
            self.activities
                .grant_admin_permissions(request, org.organization_id)
        })
        .await?;
        state.permissions_granted = true;

        if let Some(fqdn) = state.fqdn.clone() {
            run.check_deadline(deadline)?;
            let dns = run
                .step(steps::CONFIGURE_DNS, RetryPolicy::external_api(), || {
                    self.activities.configure_dns(request, &fqdn)
                })
                .await?;
            state.dns_zone_id = Some(dns.zone_id);
            state.dns_record_id = Some(dns.record_id);
            state.dns_configured = true;

            self.verify_with_polling(run, &fqdn, deadline).await?;
            state.dns_verified = true;
        }

        run.check_deadline(deadline)?;
        let generated = run
            .step(steps::GENERATE_INVITATIONS, RetryPolicy::fast_db(), || {
                self.activities
                    .generate_invitations(request, org.organization_id)
            })
            .await?;
        state.invitations = generated.invitations.clone();
        state.invitations_generated = true;

        run.check_deadline(deadline)?;
        let emails = run
            .step(steps::SEND_EMAILS, RetryPolicy::none(), || {
                self.activities.send_invitation_emails(
                    request,
                    &state.invitations,
                    state.fqdn.as_deref(),
                )
            })
            .await?;
        state.emails_sent_count = emails.sent;
        state.email_failures = emails.failures.clone();
        state.emails_sent = true;

        run.check_deadline(deadline)?;
        run.step(steps::COMPLETE_BOOTSTRAP, RetryPolicy::fast_db(), || {
            self.activities.complete_bootstrap(
                request,
                org.organization_id,
                state.fqdn.as_deref(),
                state.emails_sent_count,
                &state.email_failures,
            )
        })
        .await?;

        Ok(BootstrapResult {
            organization_id: org.organization_id,
            fqdn: state.fqdn.clone(),
            dns_configured: state.dns_configured,
            invitations: state.invitations.clone(),
            emails_sent: state.emails_sent_count,
            email_failures: state.email_failures.clone(),
        })
    }

    /// Bounded, replay-safe verification loop: durable propagation wait,
    /// then one quorum check, per attempt. Propagation delay is expected,
    /// not exceptional, so the budget is generous and lives here rather
    /// than in a per-step retry policy.
    async fn verify_with_polling(
        &self,
        run: &mut SagaRun<S, W>,
        fqdn: &str,
        deadline: Duration,
    ) -> Result<DnsQuorumResult, SagaError> {
        let mut attempt = 1u32;
        loop {
            run.check_deadline(deadline)?;
            run.sleep_until(&steps::propagation_timer(attempt), self.tuning.propagation_wait)
                .await?;

            match run
                .step(&steps::verify_dns(attempt), RetryPolicy::none(), || {
                    self.activities.verify_dns(fqdn)
                })
                .await
            {
                Ok(result) => {
                    info!(fqdn, attempt, "dns propagation verified");
                    return Ok(result);
                }
                Err(error) => {
                    let retryable = matches!(
                        &error,
                        SagaError::StepFailed { source, .. } if source.is_retryable()
                    );
                    if retryable && attempt < self.tuning.verify_attempts {
                        warn!(fqdn, attempt, %error, "dns not yet propagated, will poll again");
                        attempt += 1;
                    } else {
                        return Err(error);
                    }
                }
            }
        }
    }

    /// Undo completed steps in reverse completion order. Failures are
    /// recorded and do not stop the remaining compensations; the
    /// bootstrap-failed event always goes out last.
    async fn compensate(
        &self,
        run: &mut SagaRun<S, W>,
        request: &BootstrapRequest,
        state: &mut WorkflowState,
        original: &SagaError,
    ) {
        let organization_id = state.organization_id;

        if state.invitations_generated {
            if let Some(org) = organization_id {
                let invitations = state.invitations.clone();
                self.run_compensation(run, state, steps::REVOKE_INVITATIONS, || {
                    self.activities.revoke_invitations(request, org, &invitations)
                })
                .await;
            }
        }

        if state.dns_configured {
            if let (Some(zone_id), Some(record_id)) =
                (state.dns_zone_id.clone(), state.dns_record_id.clone())
            {
                self.run_compensation(run, state, steps::REMOVE_DNS_RECORD, || {
                    self.activities.remove_dns_record(&zone_id, &record_id)
                })
                .await;
            }
        }

        if state.organization_created {
            if let Some(org) = organization_id {
                self.run_compensation(run, state, steps::DELETE_CONTACT_RECORDS, || {
                    self.activities.delete_contact_records(request, org)
                })
                .await;

                let error_text = original.to_string();
                self.run_compensation(run, state, steps::EMIT_BOOTSTRAP_FAILED, || {
                    self.activities
                        .emit_bootstrap_failed(request, org, &error_text)
                })
                .await;
            }
        }
    }

    async fn run_compensation<F, Fut>(
        &self,
        run: &mut SagaRun<S, W>,
        state: &mut WorkflowState,
        step: &str,
        f: F,
    ) where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), tenancy_saga::ActivityError>>,
    {
        let outcome = f().await.map_err(|e| e.to_string());
        if let Err(error) = &outcome {
            state
                .compensation_errors
                .push(format!("{step}: {error}"));
        }
        if let Err(error) = run.record_compensation(step, outcome).await {
            state
                .compensation_errors
                .push(format!("{step}: checkpoint failed: {error}"));
        }
    }
}

fn map_lifecycle(error: SagaError) -> BootstrapError {
    match error {
        SagaError::AlreadyRunning(id) => BootstrapError::AlreadyRunning(id),
        SagaError::AlreadyFinished(id) => BootstrapError::AlreadyFinished(id),
        other => BootstrapError::Saga(other),
    }
}
