//! Read-only status surface over the checkpoint log.
//!
//! Polled by an external status page. Every answer is derived from durable
//! checkpoints, so an observer never sees a state that skips over a step.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use tenancy_saga::{CheckpointEvent, CheckpointEventType, EventStore, SagaId};

use crate::orchestrator::steps;
use crate::state::BootstrapStep;

/// Current position of a saga.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapStatus {
    pub current_step: BootstrapStep,
    pub organization_id: Option<Uuid>,
    pub domain: Option<String>,
    pub errors: Vec<String>,
}

/// One forward step's progress.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressMetrics {
    pub steps_completed: usize,
    pub steps_total: usize,
    /// Activity retries beyond each step's first attempt.
    pub retries: u32,
    pub elapsed: Duration,
    pub compensations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapProgress {
    pub steps: Vec<StepReport>,
    pub metrics: ProgressMetrics,
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("no bootstrap saga found: {0}")]
    NotFound(SagaId),

    #[error("event store: {0}")]
    Store(String),
}

/// The forward steps as shown on the progress surface. Verification attempts
/// collapse into one logical step; the DNS steps are omitted for sagas whose
/// input carries no subdomain.
const PROGRESS_STEPS: [&str; 7] = [
    steps::CREATE_ORGANIZATION,
    steps::GRANT_PERMISSIONS,
    steps::CONFIGURE_DNS,
    "verify-dns",
    steps::GENERATE_INVITATIONS,
    steps::SEND_EMAILS,
    steps::COMPLETE_BOOTSTRAP,
];

/// Read-only queries over a saga's checkpoint history.
pub struct StatusReader<S: EventStore> {
    event_store: Arc<S>,
}

impl<S: EventStore> StatusReader<S> {
    pub fn new(event_store: Arc<S>) -> Self {
        Self { event_store }
    }

    pub async fn get_status(&self, saga_id: &SagaId) -> Result<BootstrapStatus, StatusError> {
        let history = self.history(saga_id).await?;
        let dns_expected = has_dns_phase(&history);

        let mut organization_id = None;
        let mut domain = None;
        let mut errors = Vec::new();
        let mut current_step = BootstrapStep::Started;

        for event in &history {
            if let Some(step) = step_reached(event, dns_expected) {
                current_step = step;
            }
            match event.step_name() {
                Some(steps::CREATE_ORGANIZATION) => {
                    organization_id = event
                        .step_output()
                        .and_then(|o| o.get("organization_id"))
                        .and_then(|v| v.as_str())
                        .and_then(|s| Uuid::parse_str(s).ok());
                }
                Some(steps::CONFIGURE_DNS) => {
                    domain = event
                        .step_output()
                        .and_then(|o| o.get("fqdn"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
                _ => {}
            }
            match event.event_type {
                CheckpointEventType::CompensationFailed | CheckpointEventType::SagaFailed => {
                    if let Some(error) = event.attributes.get("error").and_then(|v| v.as_str()) {
                        errors.push(error.to_string());
                    }
                }
                _ => {}
            }
        }

        Ok(BootstrapStatus {
            current_step,
            organization_id,
            domain,
            errors,
        })
    }

    pub async fn get_progress(&self, saga_id: &SagaId) -> Result<BootstrapProgress, StatusError> {
        let history = self.history(saga_id).await?;
        let dns_expected = has_dns_phase(&history);
        let step_names: Vec<&str> = PROGRESS_STEPS
            .iter()
            .copied()
            .filter(|&name| dns_expected || !matches!(name, steps::CONFIGURE_DNS | "verify-dns"))
            .collect();

        let completed_at = |name: &str| -> Option<DateTime<Utc>> {
            history.iter().find_map(|e| match e.step_name() {
                Some(step) if step == name => Some(e.timestamp),
                Some(step) if name == "verify-dns" && step.starts_with("verify-dns-") => {
                    Some(e.timestamp)
                }
                _ => None,
            })
        };

        let steps: Vec<StepReport> = step_names
            .iter()
            .map(|&name| {
                let at = completed_at(name);
                StepReport {
                    step: name.to_string(),
                    completed: at.is_some(),
                    completed_at: at,
                }
            })
            .collect();

        let retries: u32 = history
            .iter()
            .filter(|e| e.event_type == CheckpointEventType::StepCompleted)
            .filter_map(|e| e.attributes.get("attempts").and_then(|v| v.as_u64()))
            .map(|attempts| attempts.saturating_sub(1) as u32)
            .sum();

        let compensations = history
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type,
                    CheckpointEventType::CompensationExecuted
                        | CheckpointEventType::CompensationFailed
                )
            })
            .count();

        let elapsed = match (history.first(), history.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp)
                .to_std()
                .unwrap_or_default(),
            _ => Duration::ZERO,
        };

        Ok(BootstrapProgress {
            metrics: ProgressMetrics {
                steps_completed: steps.iter().filter(|s| s.completed).count(),
                steps_total: step_names.len(),
                retries,
                elapsed,
                compensations,
            },
            steps,
        })
    }

    async fn history(&self, saga_id: &SagaId) -> Result<Vec<CheckpointEvent>, StatusError> {
        let history = self
            .event_store
            .get_history(saga_id)
            .await
            .map_err(|e| StatusError::Store(e.to_string()))?;
        if history.is_empty() {
            return Err(StatusError::NotFound(saga_id.clone()));
        }
        Ok(history)
    }
}

/// Whether the saga's input carries a subdomain and therefore a DNS phase.
/// Read from the `SagaStarted` checkpoint, the durable copy of the request.
fn has_dns_phase(history: &[CheckpointEvent]) -> bool {
    history
        .first()
        .filter(|e| e.event_type == CheckpointEventType::SagaStarted)
        .and_then(|e| e.attributes.get("input"))
        .and_then(|input| input.get("subdomain"))
        .is_some_and(|v| v.is_string())
}

/// The state a checkpoint leaves the saga in, if it moves the needle.
fn step_reached(event: &CheckpointEvent, dns_expected: bool) -> Option<BootstrapStep> {
    match event.event_type {
        CheckpointEventType::SagaStarted => Some(BootstrapStep::Started),
        CheckpointEventType::SagaCompleted => Some(BootstrapStep::Completed),
        CheckpointEventType::SagaFailed => Some(BootstrapStep::Failed),
        CheckpointEventType::CompensationExecuted | CheckpointEventType::CompensationFailed => {
            Some(BootstrapStep::Compensating)
        }
        CheckpointEventType::TimerCreated => event
            .timer_key()
            .filter(|k| k.starts_with("dns-propagation-"))
            .map(|_| BootstrapStep::AwaitingPropagation),
        CheckpointEventType::TimerFired => event
            .timer_key()
            .filter(|k| k.starts_with("dns-propagation-"))
            .map(|_| BootstrapStep::DnsVerifying),
        CheckpointEventType::StepCompleted => match event.step_name()? {
            steps::CREATE_ORGANIZATION => Some(BootstrapStep::OrgCreated),
            steps::GRANT_PERMISSIONS => Some(if dns_expected {
                BootstrapStep::DnsConfiguring
            } else {
                BootstrapStep::InvitationsGenerating
            }),
            steps::CONFIGURE_DNS => Some(BootstrapStep::DnsConfigured),
            steps::GENERATE_INVITATIONS => Some(BootstrapStep::EmailsSending),
            steps::SEND_EMAILS | steps::COMPLETE_BOOTSTRAP => Some(BootstrapStep::Completing),
            step if step.starts_with("verify-dns-") => Some(BootstrapStep::DnsVerified),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_id: u64, saga_id: &SagaId, event_type: CheckpointEventType, attributes: serde_json::Value) -> CheckpointEvent {
        CheckpointEvent::new(event_id, saga_id.clone(), event_type, attributes)
    }

    #[test]
    fn step_reached_mapping() {
        let saga_id = SagaId::from_uuid(Uuid::new_v4());
        let completed = event(
            1,
            &saga_id,
            CheckpointEventType::StepCompleted,
            CheckpointEvent::step_attributes(steps::CONFIGURE_DNS, json!({}), 1),
        );
        assert_eq!(step_reached(&completed, true), Some(BootstrapStep::DnsConfigured));

        let verify = event(
            2,
            &saga_id,
            CheckpointEventType::StepCompleted,
            CheckpointEvent::step_attributes("verify-dns-2", json!({}), 1),
        );
        assert_eq!(step_reached(&verify, true), Some(BootstrapStep::DnsVerified));

        let timer = event(
            3,
            &saga_id,
            CheckpointEventType::TimerCreated,
            CheckpointEvent::timer_attributes("dns-propagation-1", false),
        );
        assert_eq!(step_reached(&timer, true), Some(BootstrapStep::AwaitingPropagation));
    }

    #[test]
    fn granted_permissions_map_to_the_next_phase_actually_coming() {
        let saga_id = SagaId::from_uuid(Uuid::new_v4());
        let granted = event(
            1,
            &saga_id,
            CheckpointEventType::StepCompleted,
            CheckpointEvent::step_attributes(steps::GRANT_PERMISSIONS, json!({}), 1),
        );
        assert_eq!(step_reached(&granted, true), Some(BootstrapStep::DnsConfiguring));
        assert_eq!(
            step_reached(&granted, false),
            Some(BootstrapStep::InvitationsGenerating)
        );
    }

    #[tokio::test]
    async fn subdomain_less_saga_reports_no_dns_states() {
        use tenancy_testing::InMemoryEventStore;

        let store = Arc::new(InMemoryEventStore::new());
        let saga_id = SagaId::from_uuid(Uuid::new_v4());
        let history = [
            event(
                0,
                &saga_id,
                CheckpointEventType::SagaStarted,
                json!({ "input": {
                    "organization_name": "Acme Billing Partner",
                    "organization_type": "partner",
                    "parent_organization_id": Uuid::new_v4(),
                    "subdomain": null,
                    "users": [],
                    "trace_id": "trace-partner",
                }}),
            ),
            event(
                1,
                &saga_id,
                CheckpointEventType::StepCompleted,
                CheckpointEvent::step_attributes(steps::CREATE_ORGANIZATION, json!({}), 1),
            ),
            event(
                2,
                &saga_id,
                CheckpointEventType::StepCompleted,
                CheckpointEvent::step_attributes(steps::GRANT_PERMISSIONS, json!({}), 1),
            ),
        ];
        for (i, e) in history.iter().enumerate() {
            store.append_event(&saga_id, i as u64, e).await.unwrap();
        }

        let reader = StatusReader::new(store);
        let status = reader.get_status(&saga_id).await.unwrap();
        assert_eq!(status.current_step, BootstrapStep::InvitationsGenerating);

        let progress = reader.get_progress(&saga_id).await.unwrap();
        assert_eq!(progress.metrics.steps_total, 5);
        assert!(progress
            .steps
            .iter()
            .all(|s| s.step != steps::CONFIGURE_DNS && s.step != "verify-dns"));
    }
}
