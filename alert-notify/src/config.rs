//! Process configuration from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::database::default_pool_size;
use crate::encryption::SecretKey;
use crate::logging::DEFAULT_LOG_FILTER;
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:alert-notify.db?mode=rwc";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_SECRET_KEY: &str = "ALERT_NOTIFY_SECRET_KEY";
const ENV_POOL_SIZE: &str = "ALERT_NOTIFY_DB_POOL_SIZE";
const ENV_HTTP_TIMEOUT: &str = "ALERT_NOTIFY_HTTP_TIMEOUT_SECS";
const ENV_LOG_FILTER: &str = "ALERT_NOTIFY_LOG_FILTER";
const ENV_LOG_DIR: &str = "ALERT_NOTIFY_LOG_DIR";

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub database_url: String,
    pub secret_key: SecretKey,
    pub db_pool_size: u32,
    pub http_timeout: Duration,
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub log_dir: Option<PathBuf>,
}

impl NotifyConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret_key = var(ENV_SECRET_KEY)
            .ok_or_else(|| Error::config(format!("{} must be set", ENV_SECRET_KEY)))
            .and_then(SecretKey::new)?;

        let db_pool_size = match var(ENV_POOL_SIZE) {
            Some(raw) => parse::<u32>(ENV_POOL_SIZE, &raw)?.max(1),
            None => default_pool_size(),
        };

        let http_timeout = match var(ENV_HTTP_TIMEOUT) {
            Some(raw) => Duration::from_secs(parse::<u64>(ENV_HTTP_TIMEOUT, &raw)?),
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Self {
            database_url: var(ENV_DATABASE_URL).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            secret_key,
            db_pool_size,
            http_timeout,
            log_filter: var(ENV_LOG_FILTER).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_dir: var(ENV_LOG_DIR).map(PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::config(format!("invalid {} '{}': {}", key, raw, e)))
}
