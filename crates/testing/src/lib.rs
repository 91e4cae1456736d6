//! # tenancy-testing
//!
//! In-memory implementations of the tenancy-saga ports, suitable for unit
//! tests, integration tests and local development. Both stores are cheap to
//! clone (shared state behind an `Arc`) so tests can hold a handle while the
//! saga owns another.

pub mod memory_event_store;
pub mod memory_timer_store;

pub use memory_event_store::InMemoryEventStore;
pub use memory_timer_store::InMemoryTimerStore;
