//! Error taxonomy and retry policies.
//!
//! Activities classify their failures as retryable (network timeouts, rate
//! limiting, "not yet propagated") or non-retryable (malformed input,
//! configuration conflicts, authentication failures) so the runner never
//! spends retry budget on unfixable conditions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::SagaId;

/// Classification of an activity failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; the runner may retry within the step's budget.
    Retryable,
    /// Permanent; retrying would fail again. Triggers compensation.
    NonRetryable,
}

/// An activity failure with its retry classification.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ActivityError {
    pub message: String,
    pub class: ErrorClass,
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            class: ErrorClass::Retryable,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            class: ErrorClass::NonRetryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Retryable
    }
}

/// Per-activity-class retry policy with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Single attempt, no retry. Used where an outer durable loop owns the
    /// retry budget (DNS verification polling) or where partial success is
    /// handled inside the activity (email sending).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Fast, store-backed activities: organization creation, permission
    /// grants, invitation generation, event emission.
    pub fn fast_db() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// External provider APIs: DNS record configure/remove.
    pub fn external_api() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            multiplier: 2.0,
        }
    }

    /// Per-recipient email attempts. Small budget; partial success is
    /// acceptable and recorded, not raised.
    pub fn email() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Delay before retrying `attempt` (0-indexed), or `None` when the
    /// budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.powi(attempt as i32);
        let delay = self.base_delay.mul_f64(factor);
        Some(delay.min(self.max_delay))
    }
}

/// Errors from the saga runner.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga with this instance key is already active. Mutual exclusion is
    /// enforced by the deterministic key plus the store's optimistic lock,
    /// not by application-level locking.
    #[error("saga already running: {0}")]
    AlreadyRunning(SagaId),

    /// The saga already reached a terminal state.
    #[error("saga already finished: {0}")]
    AlreadyFinished(SagaId),

    /// No history exists for a saga being resumed.
    #[error("saga not started: {0}")]
    NotStarted(SagaId),

    /// An activity exhausted its retry budget or failed non-retryably.
    #[error("step '{step}' failed after {attempts} attempt(s): {source}")]
    StepFailed {
        step: String,
        attempts: u32,
        source: ActivityError,
    },

    /// The saga exceeded its hard deadline.
    #[error("saga deadline exceeded ({0:?})")]
    DeadlineExceeded(Duration),

    #[error("event store: {0}")]
    EventStore(String),

    #[error("timer store: {0}")]
    TimerStore(String),

    #[error("codec: {0}")]
    Codec(String),
}

impl SagaError {
    /// Whether the failure should trigger the compensation branch. Lifecycle
    /// rejections (duplicate start, already finished) are not compensable;
    /// nothing was executed on their behalf.
    pub fn is_compensable(&self) -> bool {
        matches!(
            self,
            SagaError::StepFailed { .. } | SagaError::DeadlineExceeded(_)
        )
    }
}
