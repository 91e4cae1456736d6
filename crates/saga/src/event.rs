//! Saga identifiers and checkpoint events.
//!
//! [`CheckpointEvent`] is the unit of durability: each one records a fact
//! about a saga instance (a step completed, a timer fired, the saga reached a
//! terminal state). The full event list for a saga is sufficient to
//! reconstruct its progress after a process restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Namespace prefix for saga instance keys. One active instance per
/// organization is guaranteed by deriving the saga id from this template.
const INSTANCE_KEY_TEMPLATE: &str = "org-bootstrap";

/// Unique identifier for a saga instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SagaId(pub Uuid);

impl SagaId {
    /// Create a SagaId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Deterministic instance key for an organization's bootstrap saga.
    ///
    /// Same organization always maps to the same saga id, so a duplicate
    /// start for an organization collides with the running instance instead
    /// of spawning a second one.
    pub fn for_organization(organization_id: Uuid) -> Self {
        let input = format!("{}:{}", INSTANCE_KEY_TEMPLATE, organization_id);
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes()))
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of checkpoint events in a saga history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointEventType {
    /// The saga instance was started with its immutable input.
    SagaStarted,
    /// A forward step completed; its output is recorded in the attributes.
    StepCompleted,
    /// A durable timer was created.
    TimerCreated,
    /// A durable timer fired (possibly early, via cancellation).
    TimerFired,
    /// A compensation executed successfully.
    CompensationExecuted,
    /// A compensation failed; the error is recorded, the saga continues
    /// compensating.
    CompensationFailed,
    /// Terminal: the saga completed successfully.
    SagaCompleted,
    /// Terminal: the saga failed after compensation.
    SagaFailed,
}

impl CheckpointEventType {
    /// Whether this event closes the saga.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SagaCompleted | Self::SagaFailed)
    }
}

/// A single durable record in a saga's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEvent {
    /// Monotonic id, local to the saga (assigned by the runner).
    pub event_id: u64,

    /// The saga this event belongs to.
    pub saga_id: SagaId,

    /// What happened.
    pub event_type: CheckpointEventType,

    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,

    /// Event-specific payload.
    pub attributes: Value,
}

impl CheckpointEvent {
    pub fn new(
        event_id: u64,
        saga_id: SagaId,
        event_type: CheckpointEventType,
        attributes: Value,
    ) -> Self {
        Self {
            event_id,
            saga_id,
            event_type,
            timestamp: Utc::now(),
            attributes,
        }
    }

    /// Attributes for a completed step.
    pub fn step_attributes(step: &str, output: Value, attempts: u32) -> Value {
        json!({ "step": step, "output": output, "attempts": attempts })
    }

    /// Attributes for timer lifecycle events.
    pub fn timer_attributes(timer_key: &str, early: bool) -> Value {
        json!({ "timer_key": timer_key, "early": early })
    }

    /// The step name, if this is a `StepCompleted` event.
    pub fn step_name(&self) -> Option<&str> {
        match self.event_type {
            CheckpointEventType::StepCompleted => {
                self.attributes.get("step").and_then(Value::as_str)
            }
            _ => None,
        }
    }

    /// The recorded step output, if this is a `StepCompleted` event.
    pub fn step_output(&self) -> Option<&Value> {
        match self.event_type {
            CheckpointEventType::StepCompleted => self.attributes.get("output"),
            _ => None,
        }
    }

    /// The timer key, if this is a timer event.
    pub fn timer_key(&self) -> Option<&str> {
        match self.event_type {
            CheckpointEventType::TimerCreated | CheckpointEventType::TimerFired => {
                self.attributes.get("timer_key").and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_key_is_deterministic() {
        let org = Uuid::new_v4();
        assert_eq!(SagaId::for_organization(org), SagaId::for_organization(org));
        assert_ne!(
            SagaId::for_organization(org),
            SagaId::for_organization(Uuid::new_v4())
        );
    }

    #[test]
    fn step_accessors() {
        let saga_id = SagaId::from_uuid(Uuid::new_v4());
        let event = CheckpointEvent::new(
            0,
            saga_id,
            CheckpointEventType::StepCompleted,
            CheckpointEvent::step_attributes("configure-dns", json!({"record_id": "r1"}), 2),
        );

        assert_eq!(event.step_name(), Some("configure-dns"));
        assert_eq!(event.step_output().unwrap()["record_id"], "r1");
        assert_eq!(event.timer_key(), None);
    }

    #[test]
    fn terminal_types() {
        assert!(CheckpointEventType::SagaCompleted.is_terminal());
        assert!(CheckpointEventType::SagaFailed.is_terminal());
        assert!(!CheckpointEventType::StepCompleted.is_terminal());
    }
}
