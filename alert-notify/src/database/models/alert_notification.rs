//! Alert notification database models.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;
use crate::notification::models::AlertNotification;
use crate::notification::state::{AlertNotificationState, NotificationStateKind};
use crate::{Error, Result};

/// Alert notification channel row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertNotificationDbModel {
    pub id: i64,
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub notifier_type: String,
    /// JSON blob of plain settings
    pub settings: String,
    /// Encrypted secure settings
    #[serde(skip)]
    pub secure_settings: Option<Vec<u8>>,
    pub is_default: bool,
    pub send_reminder: bool,
    pub frequency_secs: i64,
    pub disable_resolve_message: bool,
    pub version: i64,
    /// Unix epoch milliseconds
    pub created: i64,
    /// Unix epoch milliseconds
    pub updated: i64,
}

impl TryFrom<AlertNotificationDbModel> for AlertNotification {
    type Error = Error;

    fn try_from(row: AlertNotificationDbModel) -> Result<Self> {
        let settings = if row.settings.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            serde_json::from_str(&row.settings)?
        };
        let frequency_secs = u64::try_from(row.frequency_secs).map_err(|_| {
            Error::Database(format!(
                "alert notification {} has negative frequency {}",
                row.id, row.frequency_secs
            ))
        })?;

        Ok(Self {
            id: row.id,
            uid: row.uid,
            org_id: row.org_id,
            name: row.name,
            notifier_type: row.notifier_type,
            settings,
            secure_settings: row.secure_settings.filter(|s| !s.is_empty()),
            is_default: row.is_default,
            send_reminder: row.send_reminder,
            frequency: Duration::from_secs(frequency_secs),
            disable_resolve_message: row.disable_resolve_message,
            version: row.version,
            created: ms_to_datetime(row.created),
            updated: ms_to_datetime(row.updated),
        })
    }
}

/// Per (alert, notifier) delivery state row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertNotificationStateDbModel {
    pub id: i64,
    pub org_id: i64,
    pub alert_id: i64,
    pub notifier_id: i64,
    /// unknown, pending or completed
    pub state: String,
    pub version: i64,
    /// Unix epoch milliseconds
    pub updated_at: i64,
    pub alert_rule_state_updated_version: i64,
}

impl TryFrom<AlertNotificationStateDbModel> for AlertNotificationState {
    type Error = Error;

    fn try_from(row: AlertNotificationStateDbModel) -> Result<Self> {
        let state = row.state.parse::<NotificationStateKind>().map_err(|_| {
            Error::Database(format!(
                "invalid notification state '{}' for row {}",
                row.state, row.id
            ))
        })?;

        Ok(Self {
            id: row.id,
            org_id: row.org_id,
            alert_id: row.alert_id,
            notifier_id: row.notifier_id,
            state,
            version: row.version,
            updated_at: ms_to_datetime(row.updated_at),
            alert_rule_state_updated_version: row.alert_rule_state_updated_version,
        })
    }
}
