//! Alert notification domain types and commands.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Maximum length of a caller-chosen notification uid.
pub const MAX_UID_LENGTH: usize = 40;

/// A configured notification channel.
#[derive(Clone, Serialize)]
pub struct AlertNotification {
    pub id: i64,
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    /// Registry dispatch tag, e.g. "googlechat".
    #[serde(rename = "type")]
    pub notifier_type: String,
    pub settings: Value,
    /// Ciphertext of the secure settings map. Never serialized.
    #[serde(skip)]
    pub secure_settings: Option<Vec<u8>>,
    pub is_default: bool,
    pub send_reminder: bool,
    /// Serialized as whole seconds.
    #[serde(with = "duration_secs")]
    pub frequency: Duration,
    pub disable_resolve_message: bool,
    pub version: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl fmt::Debug for AlertNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertNotification")
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("org_id", &self.org_id)
            .field("name", &self.name)
            .field("notifier_type", &self.notifier_type)
            .field("settings", &self.settings)
            .field(
                "secure_settings",
                &self.secure_settings.as_ref().map(|s| format!("<{} bytes>", s.len())),
            )
            .field("is_default", &self.is_default)
            .field("send_reminder", &self.send_reminder)
            .field("frequency", &self.frequency)
            .field("disable_resolve_message", &self.disable_resolve_message)
            .field("version", &self.version)
            .finish()
    }
}

impl AlertNotification {
    /// Look up a plain string setting.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    /// Look up a plain boolean setting, defaulting to `false`.
    pub fn setting_bool(&self, key: &str) -> bool {
        self.settings
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Reminder frequency as stored: whole seconds that fit in an `i64`.
pub fn frequency_to_secs(frequency: Duration) -> Result<i64> {
    i64::try_from(frequency.as_secs()).map_err(|_| {
        Error::validation(format!(
            "frequency of {} seconds is out of range",
            frequency.as_secs()
        ))
    })
}

/// (De)serialize a [`Duration`] as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

fn empty_settings() -> Value {
    Value::Object(Default::default())
}

/// Command to create a new alert notification.
#[derive(Clone, Deserialize)]
pub struct CreateAlertNotificationCommand {
    #[serde(default)]
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub notifier_type: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub send_reminder: bool,
    #[serde(default, with = "duration_secs")]
    pub frequency: Duration,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default = "empty_settings")]
    pub settings: Value,
    #[serde(default)]
    pub secure_settings: HashMap<String, String>,
}

impl CreateAlertNotificationCommand {
    pub fn new(org_id: i64, name: impl Into<String>, notifier_type: impl Into<String>) -> Self {
        Self {
            uid: String::new(),
            org_id,
            name: name.into(),
            notifier_type: notifier_type.into(),
            is_default: false,
            send_reminder: false,
            frequency: Duration::ZERO,
            disable_resolve_message: false,
            settings: empty_settings(),
            secure_settings: HashMap::new(),
        }
    }
}

/// Command to update an existing alert notification by id.
///
/// Secure settings omitted from `secure_settings` keep their stored values.
#[derive(Clone, Deserialize)]
pub struct UpdateAlertNotificationCommand {
    pub id: i64,
    /// Empty keeps the stored uid. A different value is rejected; use a rekey.
    #[serde(default)]
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub notifier_type: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub send_reminder: bool,
    #[serde(default, with = "duration_secs")]
    pub frequency: Duration,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default = "empty_settings")]
    pub settings: Value,
    #[serde(default)]
    pub secure_settings: HashMap<String, String>,
}

impl UpdateAlertNotificationCommand {
    pub fn new(
        id: i64,
        org_id: i64,
        name: impl Into<String>,
        notifier_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            uid: String::new(),
            org_id,
            name: name.into(),
            notifier_type: notifier_type.into(),
            is_default: false,
            send_reminder: false,
            frequency: Duration::ZERO,
            disable_resolve_message: false,
            settings: empty_settings(),
            secure_settings: HashMap::new(),
        }
    }
}

/// Command to update an alert notification addressed by uid.
#[derive(Clone, Deserialize)]
pub struct UpdateAlertNotificationWithUidCommand {
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub notifier_type: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub send_reminder: bool,
    #[serde(default, with = "duration_secs")]
    pub frequency: Duration,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default = "empty_settings")]
    pub settings: Value,
    #[serde(default)]
    pub secure_settings: HashMap<String, String>,
}

impl UpdateAlertNotificationWithUidCommand {
    pub(crate) fn into_update(self, id: i64) -> UpdateAlertNotificationCommand {
        UpdateAlertNotificationCommand {
            id,
            uid: self.uid,
            org_id: self.org_id,
            name: self.name,
            notifier_type: self.notifier_type,
            is_default: self.is_default,
            send_reminder: self.send_reminder,
            frequency: self.frequency,
            disable_resolve_message: self.disable_resolve_message,
            settings: self.settings,
            secure_settings: self.secure_settings,
        }
    }
}

/// Command to move an alert notification to a new uid.
#[derive(Debug, Clone, Deserialize)]
pub struct RekeyUidCommand {
    pub org_id: i64,
    pub uid: String,
    pub new_uid: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeleteAlertNotificationCommand {
    pub org_id: i64,
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAlertNotificationWithUidCommand {
    pub org_id: i64,
    pub uid: String,
}

/// Row to insert, with secure settings already encrypted.
#[derive(Clone)]
pub struct NewAlertNotification {
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    pub notifier_type: String,
    pub settings: Value,
    pub secure_settings: Vec<u8>,
    pub is_default: bool,
    pub send_reminder: bool,
    pub frequency: Duration,
    pub disable_resolve_message: bool,
}

/// Full replacement of a stored row, gated on the version that was read.
#[derive(Clone)]
pub struct AlertNotificationUpdate {
    pub id: i64,
    pub org_id: i64,
    pub expected_version: i64,
    pub name: String,
    pub notifier_type: String,
    pub settings: Value,
    pub secure_settings: Vec<u8>,
    pub is_default: bool,
    pub send_reminder: bool,
    pub frequency: Duration,
    pub disable_resolve_message: bool,
}
