//! In-memory [`TimerStore`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tenancy_saga::port::timer_store::{TimerStore, TimerStoreError};
use tenancy_saga::{DurableTimer, SagaId, TimerStatus};

/// In-memory timer store keyed by timer id.
#[derive(Clone, Default)]
pub struct InMemoryTimerStore {
    timers: Arc<RwLock<HashMap<String, DurableTimer>>>,
}

impl InMemoryTimerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending timer for `timer_key`, if any. This is what a
    /// "retry now" request does: the waiting saga observes the cancellation
    /// as an early fire.
    pub async fn cancel_by_key(
        &self,
        saga_id: &SagaId,
        timer_key: &str,
    ) -> Result<bool, TimerStoreError<std::convert::Infallible>> {
        let timer = self.get_timer_by_key(saga_id, timer_key).await?;
        match timer {
            Some(timer) if timer.status == TimerStatus::Pending => {
                self.cancel_timer(&timer.timer_id).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_status(
        &self,
        timer_id: &str,
        from: TimerStatus,
        to: TimerStatus,
    ) -> Result<(), TimerStoreError<std::convert::Infallible>> {
        let mut timers = self.timers.write();
        let timer = timers
            .get_mut(timer_id)
            .ok_or_else(|| TimerStoreError::NotFound(timer_id.to_string()))?;
        if timer.status == from {
            timer.status = to;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TimerStore for InMemoryTimerStore {
    type Error = std::convert::Infallible;

    async fn create_timer(&self, timer: &DurableTimer) -> Result<(), TimerStoreError<Self::Error>> {
        self.timers
            .write()
            .insert(timer.timer_id.clone(), timer.clone());
        Ok(())
    }

    async fn cancel_timer(&self, timer_id: &str) -> Result<(), TimerStoreError<Self::Error>> {
        self.set_status(timer_id, TimerStatus::Pending, TimerStatus::Cancelled)
    }

    async fn mark_fired(&self, timer_id: &str) -> Result<(), TimerStoreError<Self::Error>> {
        self.set_status(timer_id, TimerStatus::Pending, TimerStatus::Fired)
    }

    async fn get_timer_by_key(
        &self,
        saga_id: &SagaId,
        timer_key: &str,
    ) -> Result<Option<DurableTimer>, TimerStoreError<Self::Error>> {
        Ok(self
            .timers
            .read()
            .values()
            .find(|t| &t.saga_id == saga_id && t.timer_key == timer_key)
            .cloned())
    }

    async fn get_timers_for_saga(
        &self,
        saga_id: &SagaId,
    ) -> Result<Vec<DurableTimer>, TimerStoreError<Self::Error>> {
        let mut timers: Vec<DurableTimer> = self
            .timers
            .read()
            .values()
            .filter(|t| &t.saga_id == saga_id)
            .cloned()
            .collect();
        timers.sort_by_key(|t| (t.status != TimerStatus::Pending, t.fire_at));
        Ok(timers)
    }
}
