//! EventStore port.

use std::fmt::Debug;

use crate::event::{CheckpointEvent, SagaId};

/// Errors from event store operations.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError<E> {
    /// Optimistic locking detected a concurrent writer.
    #[error("conflict: expected event_id {expected}, current is {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// Backend-specific error.
    #[error("backend error: {0:?}")]
    Backend(E),

    /// Serialization error.
    #[error("codec error: {0}")]
    Codec(String),
}

impl<E> EventStoreError<E> {
    pub fn conflict(expected: u64, actual: u64) -> Self {
        Self::Conflict { expected, actual }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl<E> From<E> for EventStoreError<E> {
    fn from(err: E) -> Self {
        EventStoreError::Backend(err)
    }
}

/// Append-only storage for saga checkpoint history.
///
/// # Concurrency model
///
/// `append_event` takes `expected_next_event_id`; if the saga's current
/// event id differs the store returns [`EventStoreError::Conflict`]. The
/// runner uses the conflict on the very first append to reject a duplicate
/// saga start mapping to the same deterministic instance key.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Backend error type.
    type Error: Debug + Send + Sync + 'static;

    /// Append one event. Returns the id of the appended event.
    async fn append_event(
        &self,
        saga_id: &SagaId,
        expected_next_event_id: u64,
        event: &CheckpointEvent,
    ) -> Result<u64, EventStoreError<Self::Error>>;

    /// Complete history for a saga, in order. Empty if the saga is unknown.
    async fn get_history(
        &self,
        saga_id: &SagaId,
    ) -> Result<Vec<CheckpointEvent>, EventStoreError<Self::Error>>;

    /// Id the next append is expected to use (0 for a fresh saga).
    async fn get_current_event_id(
        &self,
        saga_id: &SagaId,
    ) -> Result<u64, EventStoreError<Self::Error>>;

    /// Whether the saga has any events.
    async fn saga_exists(&self, saga_id: &SagaId) -> Result<bool, EventStoreError<Self::Error>>;
}
