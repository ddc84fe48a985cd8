//! Service layer module.
//!
//! Wires the store, encryption, notifier registry and HTTP sender into the
//! alert notification service.

pub mod container;

pub use container::ServiceContainer;
