//! alert-notify library crate.
//!
//! Alert notification channel configuration, secure settings encryption and
//! version-gated delivery state.

pub mod config;
pub mod database;
pub mod encryption;
pub mod error;
pub mod logging;
pub mod notification;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
