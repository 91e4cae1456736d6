//! Ports for infrastructure adapters.
//!
//! The substrate depends on two durable stores: an append-only
//! [`EventStore`] for checkpoint history and a [`TimerStore`] for timers
//! that survive process restarts. Backends implement these traits;
//! `tenancy-testing` provides in-memory implementations.

pub mod event_store;
pub mod timer_store;

pub use event_store::{EventStore, EventStoreError};
pub use timer_store::{DurableTimer, TimerStatus, TimerStore, TimerStoreError};
