//! Repository layer for database access.
//!
//! The notification store contract and its SQLite implementation.

pub mod alert_notification;

pub use alert_notification::*;
