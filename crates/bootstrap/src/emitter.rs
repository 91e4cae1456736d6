//! Idempotent domain-event emitter.
//!
//! Every state change the saga makes is announced as an append-only
//! [`DomainEvent`]. The emitter derives a deterministic event id from the
//! event's content, and the log enforces uniqueness on that id, so emitting
//! the same logical event twice (a replayed activity, a retried append)
//! stores exactly one record.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tenancy_saga::ActivityError;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// An append-only domain event. Never updated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub stream_id: String,
    pub stream_type: String,
    pub event_type: String,
    pub data: Value,
    pub metadata: Value,
    /// Content-derived idempotency key, unique in the log.
    pub deterministic_id: Uuid,
}

/// Outcome of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The deterministic id already exists. Success, not an error.
    Duplicate,
}

/// Errors from the event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Transient store failure; safe to retry, the dedup key absorbs the
    /// replay.
    #[error("event log unavailable: {0}")]
    Unavailable(String),

    /// The log refused the event for good.
    #[error("event rejected: {0}")]
    Rejected(String),
}

impl From<EventLogError> for ActivityError {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::Unavailable(_) => ActivityError::retryable(err.to_string()),
            EventLogError::Rejected(_) => ActivityError::permanent(err.to_string()),
        }
    }
}

/// Append-only event storage with a uniqueness constraint on the
/// deterministic event id.
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: &DomainEvent) -> Result<AppendOutcome, EventLogError>;
}

/// Emitter that derives the deterministic id and treats duplicate appends as
/// success. Never blocks on downstream consumers; the append is the whole
/// side effect.
#[derive(Clone)]
pub struct IdempotentEmitter {
    log: Arc<dyn EventLog>,
}

impl IdempotentEmitter {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Emit one event. Returns the deterministic event id whether the event
    /// was appended now or already present.
    pub async fn emit(
        &self,
        stream_id: &str,
        stream_type: &str,
        event_type: &str,
        data: Value,
        metadata: Value,
    ) -> Result<Uuid, EventLogError> {
        let deterministic_id = deterministic_event_id(event_type, stream_id, &data);
        let event = DomainEvent {
            stream_id: stream_id.to_string(),
            stream_type: stream_type.to_string(),
            event_type: event_type.to_string(),
            data,
            metadata,
            deterministic_id,
        };
        match self.log.append(&event).await? {
            AppendOutcome::Appended => {
                debug!(event_type, stream_id, event_id = %deterministic_id, "event appended");
            }
            AppendOutcome::Duplicate => {
                debug!(event_type, stream_id, event_id = %deterministic_id, "duplicate event, no-op");
            }
        }
        Ok(deterministic_id)
    }
}

/// UUID v5 over `(event_type, stream_id, canonical data)`. serde_json
/// serializes objects with sorted keys (maps are BTree-backed), so
/// semantically-equal data canonicalizes identically.
fn deterministic_event_id(event_type: &str, stream_id: &str, data: &Value) -> Uuid {
    let canonical = data.to_string();
    let input = format!("{event_type}\u{1f}{stream_id}\u{1f}{canonical}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes())
}

/// In-memory event log. The mock tier for the consumed event-store port,
/// also used throughout the test suites. Supports injecting failures per
/// event type.
#[derive(Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<DomainEvent>>,
    seen_ids: RwLock<HashSet<Uuid>>,
    reject_types: RwLock<HashSet<String>>,
    unavailable_types: RwLock<HashSet<String>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored events, in append order.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    /// Number of stored events of the given type.
    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Make appends of `event_type` fail permanently.
    pub fn reject_event_type(&self, event_type: &str) {
        self.reject_types.write().insert(event_type.to_string());
    }

    /// Make appends of `event_type` fail transiently.
    pub fn make_unavailable(&self, event_type: &str) {
        self.unavailable_types.write().insert(event_type.to_string());
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        self.reject_types.write().clear();
        self.unavailable_types.write().clear();
    }
}

#[async_trait::async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: &DomainEvent) -> Result<AppendOutcome, EventLogError> {
        if self.reject_types.read().contains(&event.event_type) {
            return Err(EventLogError::Rejected(format!(
                "injected rejection for {}",
                event.event_type
            )));
        }
        if self.unavailable_types.read().contains(&event.event_type) {
            return Err(EventLogError::Unavailable(format!(
                "injected outage for {}",
                event.event_type
            )));
        }

        let mut seen = self.seen_ids.write();
        if !seen.insert(event.deterministic_id) {
            return Ok(AppendOutcome::Duplicate);
        }
        self.events.write().push(event.clone());
        Ok(AppendOutcome::Appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn same_logical_event_is_stored_once() {
        let log = Arc::new(InMemoryEventLog::new());
        let emitter = IdempotentEmitter::new(log.clone());

        let data = json!({ "name": "Acme Health", "subdomain": "acme" });
        let first = emitter
            .emit("org-1", "organization", "organization.created", data.clone(), json!({}))
            .await
            .unwrap();
        let second = emitter
            .emit("org-1", "organization", "organization.created", data, json!({}))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(log.count_of("organization.created"), 1);
    }

    #[tokio::test]
    async fn key_order_does_not_affect_identity() {
        // serde_json objects are key-sorted, so these are the same event.
        let a = deterministic_event_id(
            "organization.created",
            "org-1",
            &json!({ "a": 1, "b": 2 }),
        );
        let b = deterministic_event_id(
            "organization.created",
            "org-1",
            &json!({ "b": 2, "a": 1 }),
        );
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_data_is_not_deduplicated() {
        let log = Arc::new(InMemoryEventLog::new());
        let emitter = IdempotentEmitter::new(log.clone());

        emitter
            .emit("org-1", "organization", "dns.verified", json!({ "attempt": 1 }), json!({}))
            .await
            .unwrap();
        emitter
            .emit("org-1", "organization", "dns.verified", json!({ "attempt": 2 }), json!({}))
            .await
            .unwrap();

        assert_eq!(log.count_of("dns.verified"), 2);
    }

    #[tokio::test]
    async fn injected_failures_classify_correctly() {
        let log = Arc::new(InMemoryEventLog::new());
        let emitter = IdempotentEmitter::new(log.clone());

        log.make_unavailable("invitation.created");
        let err = emitter
            .emit("org-1", "organization", "invitation.created", json!({}), json!({}))
            .await
            .unwrap_err();
        assert!(ActivityError::from(err).is_retryable());

        log.heal();
        log.reject_event_type("invitation.created");
        let err = emitter
            .emit("org-1", "organization", "invitation.created", json!({}), json!({}))
            .await
            .unwrap_err();
        assert!(!ActivityError::from(err).is_retryable());
    }
}
