//! Database models for alert-notify.
//!
//! These models map directly to the database schema; conversions into the
//! notification domain types live next to them.

pub mod alert_notification;

pub use alert_notification::*;
