//! In-memory [`EventStore`] with optimistic locking.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tenancy_saga::port::event_store::{EventStore, EventStoreError};
use tenancy_saga::{CheckpointEvent, SagaId};

/// In-memory event store backed by a `HashMap` of per-saga logs.
///
/// Enforces the same optimistic-locking contract as a durable backend: an
/// append with a stale `expected_next_event_id` is rejected with a conflict.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    histories: Arc<RwLock<HashMap<SagaId, Vec<CheckpointEvent>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sagas with at least one event.
    pub fn saga_count(&self) -> usize {
        self.histories.read().len()
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    type Error = std::convert::Infallible;

    async fn append_event(
        &self,
        saga_id: &SagaId,
        expected_next_event_id: u64,
        event: &CheckpointEvent,
    ) -> Result<u64, EventStoreError<Self::Error>> {
        let mut histories = self.histories.write();
        let history = histories.entry(saga_id.clone()).or_default();
        let current = history.len() as u64;
        if current != expected_next_event_id {
            return Err(EventStoreError::conflict(expected_next_event_id, current));
        }
        history.push(event.clone());
        Ok(event.event_id)
    }

    async fn get_history(
        &self,
        saga_id: &SagaId,
    ) -> Result<Vec<CheckpointEvent>, EventStoreError<Self::Error>> {
        Ok(self
            .histories
            .read()
            .get(saga_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_current_event_id(
        &self,
        saga_id: &SagaId,
    ) -> Result<u64, EventStoreError<Self::Error>> {
        Ok(self
            .histories
            .read()
            .get(saga_id)
            .map(|h| h.len() as u64)
            .unwrap_or(0))
    }

    async fn saga_exists(&self, saga_id: &SagaId) -> Result<bool, EventStoreError<Self::Error>> {
        Ok(self
            .histories
            .read()
            .get(saga_id)
            .is_some_and(|h| !h.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenancy_saga::CheckpointEventType;
    use uuid::Uuid;

    fn event(saga_id: &SagaId, event_id: u64) -> CheckpointEvent {
        CheckpointEvent::new(
            event_id,
            saga_id.clone(),
            CheckpointEventType::StepCompleted,
            json!({ "step": "s", "output": null, "attempts": 1 }),
        )
    }

    #[tokio::test]
    async fn append_enforces_expected_event_id() {
        let store = InMemoryEventStore::new();
        let saga_id = SagaId::from_uuid(Uuid::new_v4());

        store
            .append_event(&saga_id, 0, &event(&saga_id, 0))
            .await
            .unwrap();

        // Stale expectation is a conflict.
        let err = store
            .append_event(&saga_id, 0, &event(&saga_id, 0))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        store
            .append_event(&saga_id, 1, &event(&saga_id, 1))
            .await
            .unwrap();
        assert_eq!(store.get_current_event_id(&saga_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn histories_are_isolated_per_saga() {
        let store = InMemoryEventStore::new();
        let a = SagaId::from_uuid(Uuid::new_v4());
        let b = SagaId::from_uuid(Uuid::new_v4());

        store.append_event(&a, 0, &event(&a, 0)).await.unwrap();

        assert!(store.saga_exists(&a).await.unwrap());
        assert!(!store.saga_exists(&b).await.unwrap());
        assert!(store.get_history(&b).await.unwrap().is_empty());
    }
}
