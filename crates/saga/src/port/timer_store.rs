//! TimerStore port for durable timers.
//!
//! Long waits (DNS propagation) are persisted as timers with an absolute
//! `fire_at`, never as in-memory sleeps. After a restart the runner reloads
//! the timer and waits out only the remaining time.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::SagaId;

/// Errors from timer store operations.
#[derive(Debug, thiserror::Error)]
pub enum TimerStoreError<E> {
    #[error("backend error: {0:?}")]
    Backend(E),

    #[error("timer not found: {0}")]
    NotFound(String),
}

impl<E> From<E> for TimerStoreError<E> {
    fn from(err: E) -> Self {
        TimerStoreError::Backend(err)
    }
}

/// Status of a durable timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    /// Waiting to fire.
    Pending,
    /// Deadline reached (or cancelled early) and observed by the runner.
    Fired,
    /// Cancelled before firing; observed by the waiting runner as an early
    /// fire (the manual "retry now" signal).
    Cancelled,
}

/// A timer that persists across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableTimer {
    pub timer_id: String,

    pub saga_id: SagaId,

    /// Stable key within the saga (e.g. `dns-propagation-2`); the runner
    /// looks timers up by key during replay.
    pub timer_key: String,

    pub fire_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub status: TimerStatus,
}

impl DurableTimer {
    pub fn new(saga_id: SagaId, timer_key: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        Self {
            timer_id: Uuid::new_v4().to_string(),
            saga_id,
            timer_key: timer_key.into(),
            fire_at,
            created_at: Utc::now(),
            status: TimerStatus::Pending,
        }
    }

    /// Whether the deadline has passed for a pending timer.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TimerStatus::Pending && self.fire_at <= now
    }
}

/// Durable timer storage.
#[async_trait::async_trait]
pub trait TimerStore: Send + Sync {
    /// Backend error type.
    type Error: Debug + Send + Sync + 'static;

    async fn create_timer(&self, timer: &DurableTimer) -> Result<(), TimerStoreError<Self::Error>>;

    /// Cancel a pending timer. Cancelling a fired timer is a no-op.
    async fn cancel_timer(&self, timer_id: &str) -> Result<(), TimerStoreError<Self::Error>>;

    /// Mark a timer fired. Firing a cancelled timer is a no-op.
    async fn mark_fired(&self, timer_id: &str) -> Result<(), TimerStoreError<Self::Error>>;

    /// Look a timer up by its saga-scoped key.
    async fn get_timer_by_key(
        &self,
        saga_id: &SagaId,
        timer_key: &str,
    ) -> Result<Option<DurableTimer>, TimerStoreError<Self::Error>>;

    /// All timers for a saga, pending ones first.
    async fn get_timers_for_saga(
        &self,
        saga_id: &SagaId,
    ) -> Result<Vec<DurableTimer>, TimerStoreError<Self::Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn due_only_when_pending_and_past_deadline() {
        let saga_id = SagaId::from_uuid(Uuid::new_v4());
        let now = Utc::now();

        let future = DurableTimer::new(saga_id.clone(), "wait", now + Duration::from_secs(60));
        assert!(!future.is_due(now));

        let mut past = DurableTimer::new(saga_id, "wait", now - Duration::from_secs(1));
        assert!(past.is_due(now));

        past.status = TimerStatus::Fired;
        assert!(!past.is_due(now));
    }
}
