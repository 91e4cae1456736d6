//! The [`SagaRun`] replay/checkpoint runner.
//!
//! A `SagaRun` drives one saga instance as a single logical thread of
//! control. Each completed step is appended to the event store before the
//! run advances, and on restart the history is replayed so completed steps
//! return their recorded output instead of executing again.
//!
//! The runner itself reads no wall clock and no randomness for decisions:
//! the start timestamp comes from the `SagaStarted` checkpoint and waits go
//! through persisted timers, so crash-and-replay reconstructs the same
//! execution.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ActivityError, RetryPolicy, SagaError};
use crate::event::{CheckpointEvent, CheckpointEventType, SagaId};
use crate::port::{
    DurableTimer, EventStore, EventStoreError, TimerStatus, TimerStore, TimerStoreError,
};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct SagaRunConfig {
    /// How often a waiting runner re-checks its persisted timer.
    pub timer_poll_interval: Duration,
}

impl Default for SagaRunConfig {
    fn default() -> Self {
        Self {
            timer_poll_interval: Duration::from_millis(250),
        }
    }
}

/// One in-flight saga instance backed by durable checkpoints.
pub struct SagaRun<S, W>
where
    S: EventStore,
    W: TimerStore,
{
    saga_id: SagaId,
    event_store: Arc<S>,
    timer_store: Arc<W>,
    config: SagaRunConfig,
    next_event_id: u64,
    completed_steps: HashMap<String, Value>,
    fired_timers: HashSet<String>,
    started_at: DateTime<Utc>,
}

impl<S, W> SagaRun<S, W>
where
    S: EventStore,
    W: TimerStore,
{
    /// Start a fresh saga instance.
    ///
    /// Rejected with [`SagaError::AlreadyRunning`] if history already exists
    /// for this instance key or if a concurrent starter wins the first
    /// append (optimistic-lock conflict). Rejected with
    /// [`SagaError::AlreadyFinished`] if the instance reached a terminal
    /// state.
    pub async fn start(
        event_store: Arc<S>,
        timer_store: Arc<W>,
        config: SagaRunConfig,
        saga_id: SagaId,
        input: Value,
    ) -> Result<Self, SagaError> {
        let history = event_store
            .get_history(&saga_id)
            .await
            .map_err(map_store_err)?;
        if let Some(last) = history.last() {
            if last.event_type.is_terminal() {
                return Err(SagaError::AlreadyFinished(saga_id));
            }
            return Err(SagaError::AlreadyRunning(saga_id));
        }

        let event = CheckpointEvent::new(
            0,
            saga_id.clone(),
            CheckpointEventType::SagaStarted,
            json!({ "input": input }),
        );
        match event_store.append_event(&saga_id, 0, &event).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => return Err(SagaError::AlreadyRunning(saga_id)),
            Err(e) => return Err(map_store_err(e)),
        }

        debug!(saga_id = %saga_id, "saga started");
        Ok(Self {
            saga_id,
            event_store,
            timer_store,
            config,
            next_event_id: 1,
            completed_steps: HashMap::new(),
            fired_timers: HashSet::new(),
            started_at: event.timestamp,
        })
    }

    /// Resume an interrupted saga instance from its durable history.
    pub async fn resume(
        event_store: Arc<S>,
        timer_store: Arc<W>,
        config: SagaRunConfig,
        saga_id: SagaId,
    ) -> Result<Self, SagaError> {
        let history = event_store
            .get_history(&saga_id)
            .await
            .map_err(map_store_err)?;
        let first = match history.first() {
            Some(event) => event,
            None => return Err(SagaError::NotStarted(saga_id)),
        };
        if history
            .iter()
            .any(|event| event.event_type.is_terminal())
        {
            return Err(SagaError::AlreadyFinished(saga_id));
        }

        let started_at = first.timestamp;
        let mut completed_steps = HashMap::new();
        let mut fired_timers = HashSet::new();
        for event in &history {
            if let (Some(step), Some(output)) = (event.step_name(), event.step_output()) {
                completed_steps.insert(step.to_string(), output.clone());
            }
            if event.event_type == CheckpointEventType::TimerFired {
                if let Some(key) = event.timer_key() {
                    fired_timers.insert(key.to_string());
                }
            }
        }
        let next_event_id = history.last().map(|e| e.event_id + 1).unwrap_or(0);

        debug!(
            saga_id = %saga_id,
            completed = completed_steps.len(),
            "saga resumed from history"
        );
        Ok(Self {
            saga_id,
            event_store,
            timer_store,
            config,
            next_event_id,
            completed_steps,
            fired_timers,
            started_at,
        })
    }

    pub fn saga_id(&self) -> &SagaId {
        &self.saga_id
    }

    /// Time since the durable start checkpoint (not since this process
    /// picked the saga up).
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Enforce the saga's hard ceiling. Exceeding it is a fatal,
    /// compensable failure.
    pub fn check_deadline(&self, deadline: Duration) -> Result<(), SagaError> {
        if self.elapsed() > deadline {
            return Err(SagaError::DeadlineExceeded(deadline));
        }
        Ok(())
    }

    pub fn is_step_completed(&self, name: &str) -> bool {
        self.completed_steps.contains_key(name)
    }

    /// Execute a forward step, or return its recorded output on replay.
    ///
    /// The activity runs under `policy`: retryable failures back off
    /// exponentially within the attempt budget; non-retryable failures and
    /// exhausted budgets surface as [`SagaError::StepFailed`]. The output is
    /// checkpointed before it is returned, so a crash after this call never
    /// re-executes the step.
    pub async fn step<T, F, Fut>(
        &mut self,
        name: &str,
        policy: RetryPolicy,
        f: F,
    ) -> Result<T, SagaError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        if let Some(recorded) = self.completed_steps.get(name) {
            debug!(saga_id = %self.saga_id, step = name, "step replayed from checkpoint");
            return serde_json::from_value(recorded.clone())
                .map_err(|e| SagaError::Codec(e.to_string()));
        }

        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(output) => {
                    let value = serde_json::to_value(&output)
                        .map_err(|e| SagaError::Codec(e.to_string()))?;
                    self.append(
                        CheckpointEventType::StepCompleted,
                        CheckpointEvent::step_attributes(name, value.clone(), attempt + 1),
                    )
                    .await?;
                    self.completed_steps.insert(name.to_string(), value);
                    debug!(saga_id = %self.saga_id, step = name, attempts = attempt + 1, "step completed");
                    return Ok(output);
                }
                Err(error) => {
                    let delay = if error.is_retryable() {
                        policy.delay_for(attempt)
                    } else {
                        None
                    };
                    match delay {
                        Some(delay) => {
                            warn!(
                                saga_id = %self.saga_id,
                                step = name,
                                attempt = attempt + 1,
                                error = %error,
                                ?delay,
                                "step failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            return Err(SagaError::StepFailed {
                                step: name.to_string(),
                                attempts: attempt + 1,
                                source: error,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Durable sleep identified by `timer_key`.
    ///
    /// Replay-safe: a `TimerFired` checkpoint short-circuits entirely; an
    /// existing pending timer is waited out from its persisted `fire_at`
    /// (so a restart does not extend the wait). A cancelled timer is
    /// observed as an early fire, which is how the manual "retry now"
    /// signal short-circuits the DNS-propagation wait.
    pub async fn sleep_until(&mut self, timer_key: &str, duration: Duration) -> Result<(), SagaError> {
        if self.fired_timers.contains(timer_key) {
            return Ok(());
        }

        let existing = self
            .timer_store
            .get_timer_by_key(&self.saga_id, timer_key)
            .await
            .map_err(map_timer_err)?;
        if existing.is_none() {
            let timer = DurableTimer::new(self.saga_id.clone(), timer_key, Utc::now() + duration);
            self.timer_store
                .create_timer(&timer)
                .await
                .map_err(map_timer_err)?;
            self.append(
                CheckpointEventType::TimerCreated,
                CheckpointEvent::timer_attributes(timer_key, false),
            )
            .await?;
        }

        let early = loop {
            let current = self
                .timer_store
                .get_timer_by_key(&self.saga_id, timer_key)
                .await
                .map_err(map_timer_err)?
                .ok_or_else(|| {
                    SagaError::TimerStore(format!("timer disappeared: {timer_key}"))
                })?;
            match current.status {
                TimerStatus::Fired => break false,
                TimerStatus::Cancelled => break true,
                TimerStatus::Pending => {
                    let now = Utc::now();
                    if current.is_due(now) {
                        self.timer_store
                            .mark_fired(&current.timer_id)
                            .await
                            .map_err(map_timer_err)?;
                        break false;
                    }
                    let remaining = (current.fire_at - now).to_std().unwrap_or_default();
                    tokio::time::sleep(remaining.min(self.config.timer_poll_interval)).await;
                }
            }
        };

        self.append(
            CheckpointEventType::TimerFired,
            CheckpointEvent::timer_attributes(timer_key, early),
        )
        .await?;
        self.fired_timers.insert(timer_key.to_string());
        debug!(saga_id = %self.saga_id, timer_key, early, "durable timer fired");
        Ok(())
    }

    /// Record one compensation outcome. Compensation failures are durable
    /// facts but never mask the original error.
    pub async fn record_compensation(
        &mut self,
        step: &str,
        outcome: Result<(), String>,
    ) -> Result<(), SagaError> {
        match outcome {
            Ok(()) => {
                self.append(
                    CheckpointEventType::CompensationExecuted,
                    json!({ "step": step }),
                )
                .await
            }
            Err(error) => {
                warn!(saga_id = %self.saga_id, step, error = %error, "compensation failed");
                self.append(
                    CheckpointEventType::CompensationFailed,
                    json!({ "step": step, "error": error }),
                )
                .await
            }
        }
    }

    /// Close the saga successfully. Consumes the run; the in-memory state
    /// is dropped and only the log remains.
    pub async fn complete(mut self, output: Value) -> Result<(), SagaError> {
        self.append(CheckpointEventType::SagaCompleted, json!({ "output": output }))
            .await
    }

    /// Close the saga as failed (after compensation). The original error
    /// and the compensation summary are both recorded.
    pub async fn fail(
        mut self,
        error: &str,
        compensation_errors: &[String],
    ) -> Result<(), SagaError> {
        self.append(
            CheckpointEventType::SagaFailed,
            json!({ "error": error, "compensation_errors": compensation_errors }),
        )
        .await
    }

    async fn append(
        &mut self,
        event_type: CheckpointEventType,
        attributes: Value,
    ) -> Result<(), SagaError> {
        let event = CheckpointEvent::new(
            self.next_event_id,
            self.saga_id.clone(),
            event_type,
            attributes,
        );
        self.event_store
            .append_event(&self.saga_id, self.next_event_id, &event)
            .await
            .map_err(map_store_err)?;
        self.next_event_id += 1;
        Ok(())
    }
}

fn map_store_err<E: Debug>(err: EventStoreError<E>) -> SagaError {
    SagaError::EventStore(err.to_string())
}

fn map_timer_err<E: Debug>(err: TimerStoreError<E>) -> SagaError {
    SagaError::TimerStore(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stub_stores::{StubEventStore, StubTimerStore};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Minimal in-process stores for runner tests; full-featured in-memory
    /// adapters live in the tenancy-testing crate.
    mod stub_stores {
        use super::*;
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct StubEventStore {
            events: Mutex<Vec<CheckpointEvent>>,
        }

        impl StubEventStore {
            pub fn events(&self) -> Vec<CheckpointEvent> {
                self.events.lock().unwrap().clone()
            }
        }

        #[async_trait::async_trait]
        impl EventStore for StubEventStore {
            type Error = std::convert::Infallible;

            async fn append_event(
                &self,
                _saga_id: &SagaId,
                expected_next_event_id: u64,
                event: &CheckpointEvent,
            ) -> Result<u64, EventStoreError<Self::Error>> {
                let mut events = self.events.lock().unwrap();
                let current = events.len() as u64;
                if current != expected_next_event_id {
                    return Err(EventStoreError::conflict(expected_next_event_id, current));
                }
                events.push(event.clone());
                Ok(event.event_id)
            }

            async fn get_history(
                &self,
                _saga_id: &SagaId,
            ) -> Result<Vec<CheckpointEvent>, EventStoreError<Self::Error>> {
                Ok(self.events.lock().unwrap().clone())
            }

            async fn get_current_event_id(
                &self,
                _saga_id: &SagaId,
            ) -> Result<u64, EventStoreError<Self::Error>> {
                Ok(self.events.lock().unwrap().len() as u64)
            }

            async fn saga_exists(
                &self,
                _saga_id: &SagaId,
            ) -> Result<bool, EventStoreError<Self::Error>> {
                Ok(!self.events.lock().unwrap().is_empty())
            }
        }

        #[derive(Default)]
        pub struct StubTimerStore {
            timers: Mutex<Vec<DurableTimer>>,
        }

        #[async_trait::async_trait]
        impl TimerStore for StubTimerStore {
            type Error = std::convert::Infallible;

            async fn create_timer(
                &self,
                timer: &DurableTimer,
            ) -> Result<(), TimerStoreError<Self::Error>> {
                self.timers.lock().unwrap().push(timer.clone());
                Ok(())
            }

            async fn cancel_timer(
                &self,
                timer_id: &str,
            ) -> Result<(), TimerStoreError<Self::Error>> {
                let mut timers = self.timers.lock().unwrap();
                if let Some(timer) = timers.iter_mut().find(|t| t.timer_id == timer_id) {
                    if timer.status == TimerStatus::Pending {
                        timer.status = TimerStatus::Cancelled;
                    }
                }
                Ok(())
            }

            async fn mark_fired(
                &self,
                timer_id: &str,
            ) -> Result<(), TimerStoreError<Self::Error>> {
                let mut timers = self.timers.lock().unwrap();
                if let Some(timer) = timers.iter_mut().find(|t| t.timer_id == timer_id) {
                    if timer.status == TimerStatus::Pending {
                        timer.status = TimerStatus::Fired;
                    }
                }
                Ok(())
            }

            async fn get_timer_by_key(
                &self,
                saga_id: &SagaId,
                timer_key: &str,
            ) -> Result<Option<DurableTimer>, TimerStoreError<Self::Error>> {
                Ok(self
                    .timers
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|t| &t.saga_id == saga_id && t.timer_key == timer_key)
                    .cloned())
            }

            async fn get_timers_for_saga(
                &self,
                saga_id: &SagaId,
            ) -> Result<Vec<DurableTimer>, TimerStoreError<Self::Error>> {
                Ok(self
                    .timers
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|t| &t.saga_id == saga_id)
                    .cloned()
                    .collect())
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Out {
        value: u32,
    }

    fn fast_config() -> SagaRunConfig {
        SagaRunConfig {
            timer_poll_interval: Duration::from_millis(5),
        }
    }

    fn new_saga_id() -> SagaId {
        SagaId::from_uuid(uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn step_executes_once_and_replays_from_checkpoint() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();
        let calls = AtomicU32::new(0);

        let mut run = SagaRun::start(
            store.clone(),
            timers.clone(),
            fast_config(),
            saga_id.clone(),
            json!({}),
        )
        .await
        .unwrap();

        let out: Out = run
            .step("work", RetryPolicy::none(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Out { value: 7 })
            })
            .await
            .unwrap();
        assert_eq!(out.value, 7);

        // Second invocation replays without executing.
        let replayed: Out = run
            .step("work", RetryPolicy::none(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Out { value: 99 })
            })
            .await
            .unwrap();
        assert_eq!(replayed.value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resume_rebuilds_completed_steps() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();

        {
            let mut run = SagaRun::start(
                store.clone(),
                timers.clone(),
                fast_config(),
                saga_id.clone(),
                json!({}),
            )
            .await
            .unwrap();
            let _: Out = run
                .step("first", RetryPolicy::none(), || async { Ok(Out { value: 1 }) })
                .await
                .unwrap();
            // Simulated crash: run dropped without reaching a terminal state.
        }

        let mut resumed =
            SagaRun::resume(store.clone(), timers, fast_config(), saga_id.clone())
                .await
                .unwrap();
        assert!(resumed.is_step_completed("first"));
        let out: Out = resumed
            .step("first", RetryPolicy::none(), || async {
                panic!("must not re-execute")
            })
            .await
            .unwrap();
        assert_eq!(out.value, 1);
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();

        let _run = SagaRun::start(
            store.clone(),
            timers.clone(),
            fast_config(),
            saga_id.clone(),
            json!({}),
        )
        .await
        .unwrap();

        let second = SagaRun::start(store, timers, fast_config(), saga_id, json!({})).await;
        assert!(matches!(second, Err(SagaError::AlreadyRunning(_))));
    }

    #[tokio::test]
    async fn retry_budget_respects_classification() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let calls = AtomicU32::new(0);

        let mut run = SagaRun::start(
            store.clone(),
            timers,
            fast_config(),
            new_saga_id(),
            json!({}),
        )
        .await
        .unwrap();

        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let result: Result<Out, _> = run
            .step("flaky", policy, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ActivityError::retryable("transient"))
            })
            .await;
        assert!(matches!(
            result,
            Err(SagaError::StepFailed { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Non-retryable errors do not consume the budget.
        calls.store(0, Ordering::SeqCst);
        let result: Result<Out, _> = run
            .step("broken", policy, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ActivityError::permanent("bad config"))
            })
            .await;
        assert!(matches!(
            result,
            Err(SagaError::StepFailed { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn durable_timer_fires_and_is_replayed() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();

        let mut run = SagaRun::start(
            store.clone(),
            timers.clone(),
            fast_config(),
            saga_id.clone(),
            json!({}),
        )
        .await
        .unwrap();

        run.sleep_until("wait", Duration::from_millis(20)).await.unwrap();
        let fired = store
            .events()
            .iter()
            .filter(|e| e.event_type == CheckpointEventType::TimerFired)
            .count();
        assert_eq!(fired, 1);

        // Replay: no new timer, returns immediately.
        run.sleep_until("wait", Duration::from_secs(3600)).await.unwrap();
        assert_eq!(timers.get_timers_for_saga(&saga_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_timer_is_an_early_fire() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();

        let mut run = SagaRun::start(
            store.clone(),
            timers.clone(),
            fast_config(),
            saga_id.clone(),
            json!({}),
        )
        .await
        .unwrap();

        let timers_bg = timers.clone();
        let saga_bg = saga_id.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            let timer = timers_bg
                .get_timer_by_key(&saga_bg, "long-wait")
                .await
                .unwrap()
                .unwrap();
            timers_bg.cancel_timer(&timer.timer_id).await.unwrap();
        });

        run.sleep_until("long-wait", Duration::from_secs(3600))
            .await
            .unwrap();
        canceller.await.unwrap();

        let early = store
            .events()
            .iter()
            .filter(|e| e.event_type == CheckpointEventType::TimerFired)
            .any(|e| e.attributes["early"] == json!(true));
        assert!(early);
    }

    #[tokio::test]
    async fn pending_timer_resumes_from_persisted_fire_at() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();

        let mut run = SagaRun::start(
            store.clone(),
            timers.clone(),
            fast_config(),
            saga_id.clone(),
            json!({}),
        )
        .await
        .unwrap();

        let waiter =
            tokio::spawn(async move { run.sleep_until("wait", Duration::from_millis(400)).await });

        // Wait for the TimerCreated checkpoint, then kill the waiting task
        // mid-wait to simulate a process crash.
        loop {
            let created = store
                .events()
                .iter()
                .any(|e| e.event_type == CheckpointEventType::TimerCreated);
            if created {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        waiter.abort();
        let _ = waiter.await;

        let timer = timers
            .get_timer_by_key(&saga_id, "wait")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(timer.status, TimerStatus::Pending);

        // The resumed wait is governed by the persisted fire_at, not by the
        // duration passed in, so it completes promptly instead of waiting an
        // hour.
        let mut resumed =
            SagaRun::resume(store.clone(), timers.clone(), fast_config(), saga_id.clone())
                .await
                .unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            resumed.sleep_until("wait", Duration::from_secs(3600)),
        )
        .await
        .expect("resumed wait must honour the persisted fire_at")
        .unwrap();

        // No second timer and no duplicate checkpoints.
        assert_eq!(timers.get_timers_for_saga(&saga_id).await.unwrap().len(), 1);
        let events = store.events();
        let created = events
            .iter()
            .filter(|e| e.event_type == CheckpointEventType::TimerCreated)
            .count();
        let fired = events
            .iter()
            .filter(|e| e.event_type == CheckpointEventType::TimerFired)
            .count();
        assert_eq!(created, 1);
        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn deadline_is_measured_from_the_durable_start_checkpoint() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();

        // A saga started two hours ago by a previous process.
        let mut started = CheckpointEvent::new(
            0,
            saga_id.clone(),
            CheckpointEventType::SagaStarted,
            json!({ "input": {} }),
        );
        started.timestamp = Utc::now() - chrono::Duration::hours(2);
        store.append_event(&saga_id, 0, &started).await.unwrap();

        let run = SagaRun::resume(store, timers, fast_config(), saga_id)
            .await
            .unwrap();
        assert!(matches!(
            run.check_deadline(Duration::from_secs(3600)),
            Err(SagaError::DeadlineExceeded(_))
        ));
        assert!(run.check_deadline(Duration::from_secs(3 * 3600)).is_ok());
    }

    #[tokio::test]
    async fn terminal_saga_cannot_be_resumed() {
        let store = Arc::new(StubEventStore::default());
        let timers = Arc::new(StubTimerStore::default());
        let saga_id = new_saga_id();

        let run = SagaRun::start(
            store.clone(),
            timers.clone(),
            fast_config(),
            saga_id.clone(),
            json!({}),
        )
        .await
        .unwrap();
        run.complete(json!({"ok": true})).await.unwrap();

        let resumed = SagaRun::resume(store, timers, fast_config(), saga_id).await;
        assert!(matches!(resumed, Err(SagaError::AlreadyFinished(_))));
    }
}
