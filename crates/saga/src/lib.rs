//! # tenancy-saga
//!
//! Durable saga execution substrate with zero infrastructure dependencies.
//!
//! The substrate is an explicit event-sourced state machine: every completed
//! step is persisted as a [`CheckpointEvent`] before the saga advances, and
//! [`SagaRun`] reconstructs progress from the log on restart so completed,
//! non-idempotent side effects are never re-executed.
//!
//! ## Modules
//!
//! - [`event`]: [`SagaId`], [`CheckpointEvent`], [`CheckpointEventType`]
//! - [`port`]: infrastructure ports ([`EventStore`], [`TimerStore`])
//! - [`error`]: error taxonomy and [`RetryPolicy`] presets
//! - [`run`]: the [`SagaRun`] replay/checkpoint runner

pub mod error;
pub mod event;
pub mod port;
pub mod run;

pub use error::{ActivityError, ErrorClass, RetryPolicy, SagaError};
pub use event::{CheckpointEvent, CheckpointEventType, SagaId};
pub use port::{
    DurableTimer, EventStore, EventStoreError, TimerStatus, TimerStore, TimerStoreError,
};
pub use run::{SagaRun, SagaRunConfig};
