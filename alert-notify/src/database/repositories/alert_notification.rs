//! Alert notification repository.

use async_trait::async_trait;
use rand::random;
use sqlx::SqlitePool;
use tracing::debug;

use crate::database::models::{AlertNotificationDbModel, AlertNotificationStateDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::notification::models::{
    AlertNotification, AlertNotificationUpdate, NewAlertNotification, frequency_to_secs,
};
use crate::notification::state::{
    AlertNotificationState, NotificationStateKey, NotificationStateKind, SetStateCompletedCommand,
    SetStatePendingCommand,
};
use crate::{Error, Result};

const NOTIFICATION_ENTITY: &str = "AlertNotification";
const STATE_ENTITY: &str = "AlertNotificationState";

/// Length of generated uids.
const GENERATED_UID_LENGTH: usize = 9;
const UID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Persistence contract for notification channels and their delivery state.
///
/// Lookups of missing rows return [`Error::NotFound`], distinct from storage errors.
#[async_trait]
pub trait AlertNotificationStore: Send + Sync {
    // Channels
    async fn get_config(&self, org_id: i64, id: i64) -> Result<AlertNotification>;
    async fn get_config_by_uid(&self, org_id: i64, uid: &str) -> Result<AlertNotification>;
    async fn get_config_by_name(&self, org_id: i64, name: &str) -> Result<AlertNotification>;
    async fn list_configs(&self, org_id: i64) -> Result<Vec<AlertNotification>>;
    /// Channels whose uid is listed plus every default channel.
    async fn list_configs_to_send(&self, org_id: i64, uids: &[String]) -> Result<Vec<AlertNotification>>;
    async fn insert_config(&self, config: &NewAlertNotification) -> Result<AlertNotification>;
    /// Replace a row if it is still at `update.expected_version`.
    async fn update_config(&self, update: &AlertNotificationUpdate) -> Result<AlertNotification>;
    async fn update_config_uid(&self, org_id: i64, uid: &str, new_uid: &str) -> Result<AlertNotification>;
    async fn delete_config(&self, org_id: i64, id: i64) -> Result<()>;
    /// Returns the id of the deleted row.
    async fn delete_config_by_uid(&self, org_id: i64, uid: &str) -> Result<i64>;

    // Delivery state
    async fn get_or_create_state(&self, key: NotificationStateKey) -> Result<AlertNotificationState>;
    async fn set_state_pending(&self, cmd: SetStatePendingCommand) -> Result<AlertNotificationState>;
    async fn set_state_completed(&self, cmd: SetStateCompletedCommand) -> Result<AlertNotificationState>;
}

/// Generate a short random uid for channels created without one.
pub fn generate_short_uid() -> String {
    (0..GENERATED_UID_LENGTH)
        .map(|_| UID_ALPHABET[(random::<u64>() % UID_ALPHABET.len() as u64) as usize] as char)
        .collect()
}

fn map_unique_violation(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::already_exists(NOTIFICATION_ENTITY, what())
        }
        e => e.into(),
    }
}

/// SQLx implementation of AlertNotificationStore.
pub struct SqlxAlertNotificationStore {
    pool: SqlitePool,
}

impl SqlxAlertNotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_state(&self, key: NotificationStateKey) -> Result<Option<AlertNotificationStateDbModel>> {
        let row = sqlx::query_as::<_, AlertNotificationStateDbModel>(
            "SELECT * FROM alert_notification_state WHERE org_id = ? AND alert_id = ? AND notifier_id = ?",
        )
        .bind(key.org_id)
        .bind(key.alert_id)
        .bind(key.notifier_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Explain why a conditional state update touched no row.
    async fn state_miss(&self, key: NotificationStateKey, expected: i64) -> Error {
        match self.fetch_state(key).await {
            Ok(Some(_)) => Error::version_conflict(STATE_ENTITY, key.to_string(), expected),
            Ok(None) => Error::not_found(STATE_ENTITY, key.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl AlertNotificationStore for SqlxAlertNotificationStore {
    async fn get_config(&self, org_id: i64, id: i64) -> Result<AlertNotification> {
        sqlx::query_as::<_, AlertNotificationDbModel>(
            "SELECT * FROM alert_notification WHERE org_id = ? AND id = ?",
        )
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(NOTIFICATION_ENTITY, id.to_string()))?
        .try_into()
    }

    async fn get_config_by_uid(&self, org_id: i64, uid: &str) -> Result<AlertNotification> {
        sqlx::query_as::<_, AlertNotificationDbModel>(
            "SELECT * FROM alert_notification WHERE org_id = ? AND uid = ?",
        )
        .bind(org_id)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(NOTIFICATION_ENTITY, uid))?
        .try_into()
    }

    async fn get_config_by_name(&self, org_id: i64, name: &str) -> Result<AlertNotification> {
        sqlx::query_as::<_, AlertNotificationDbModel>(
            "SELECT * FROM alert_notification WHERE org_id = ? AND name = ?",
        )
        .bind(org_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(NOTIFICATION_ENTITY, name))?
        .try_into()
    }

    async fn list_configs(&self, org_id: i64) -> Result<Vec<AlertNotification>> {
        let rows = sqlx::query_as::<_, AlertNotificationDbModel>(
            "SELECT * FROM alert_notification WHERE org_id = ? ORDER BY name",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AlertNotification::try_from).collect()
    }

    async fn list_configs_to_send(&self, org_id: i64, uids: &[String]) -> Result<Vec<AlertNotification>> {
        let mut sql = String::from("SELECT * FROM alert_notification WHERE org_id = ? AND (is_default = 1");
        if !uids.is_empty() {
            let placeholders = vec!["?"; uids.len()].join(", ");
            sql.push_str(&format!(" OR uid IN ({})", placeholders));
        }
        sql.push_str(") ORDER BY name");

        let mut query = sqlx::query_as::<_, AlertNotificationDbModel>(&sql).bind(org_id);
        for uid in uids {
            query = query.bind(uid);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(AlertNotification::try_from).collect()
    }

    async fn insert_config(&self, config: &NewAlertNotification) -> Result<AlertNotification> {
        let uid = if config.uid.is_empty() {
            generate_short_uid()
        } else {
            config.uid.clone()
        };
        let settings = serde_json::to_string(&config.settings)?;
        let frequency_secs = frequency_to_secs(config.frequency)?;

        let row = retry_on_sqlite_busy("insert_alert_notification", || async {
            let now = now_ms();
            sqlx::query_as::<_, AlertNotificationDbModel>(
                r#"
                INSERT INTO alert_notification (
                    uid, org_id, name, type, settings, secure_settings, is_default,
                    send_reminder, frequency_secs, disable_resolve_message, version,
                    created, updated
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                RETURNING *
                "#,
            )
            .bind(&uid)
            .bind(config.org_id)
            .bind(&config.name)
            .bind(&config.notifier_type)
            .bind(&settings)
            .bind(&config.secure_settings)
            .bind(config.is_default)
            .bind(config.send_reminder)
            .bind(frequency_secs)
            .bind(config.disable_resolve_message)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || format!("{} (uid {})", config.name, uid)))
        })
        .await?;

        debug!(id = row.id, uid = %row.uid, "Inserted alert notification");
        row.try_into()
    }

    async fn update_config(&self, update: &AlertNotificationUpdate) -> Result<AlertNotification> {
        let settings = serde_json::to_string(&update.settings)?;
        let frequency_secs = frequency_to_secs(update.frequency)?;

        let row = retry_on_sqlite_busy("update_alert_notification", || async {
            sqlx::query_as::<_, AlertNotificationDbModel>(
                r#"
                UPDATE alert_notification SET
                    name = ?,
                    type = ?,
                    settings = ?,
                    secure_settings = ?,
                    is_default = ?,
                    send_reminder = ?,
                    frequency_secs = ?,
                    disable_resolve_message = ?,
                    version = version + 1,
                    updated = ?
                WHERE id = ? AND org_id = ? AND version = ?
                RETURNING *
                "#,
            )
            .bind(&update.name)
            .bind(&update.notifier_type)
            .bind(&settings)
            .bind(&update.secure_settings)
            .bind(update.is_default)
            .bind(update.send_reminder)
            .bind(frequency_secs)
            .bind(update.disable_resolve_message)
            .bind(now_ms())
            .bind(update.id)
            .bind(update.org_id)
            .bind(update.expected_version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || update.name.clone()))
        })
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get_config(update.org_id, update.id).await {
                Ok(_) => Err(Error::version_conflict(
                    NOTIFICATION_ENTITY,
                    update.id.to_string(),
                    update.expected_version,
                )),
                Err(e) => Err(e),
            },
        }
    }

    async fn update_config_uid(&self, org_id: i64, uid: &str, new_uid: &str) -> Result<AlertNotification> {
        let row = retry_on_sqlite_busy("update_alert_notification_uid", || async {
            sqlx::query_as::<_, AlertNotificationDbModel>(
                r#"
                UPDATE alert_notification SET
                    uid = ?,
                    version = version + 1,
                    updated = ?
                WHERE org_id = ? AND uid = ?
                RETURNING *
                "#,
            )
            .bind(new_uid)
            .bind(now_ms())
            .bind(org_id)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || new_uid.to_string()))
        })
        .await?;

        row.ok_or_else(|| Error::not_found(NOTIFICATION_ENTITY, uid))?
            .try_into()
    }

    async fn delete_config(&self, org_id: i64, id: i64) -> Result<()> {
        retry_on_sqlite_busy("delete_alert_notification", || async {
            let mut tx = self.pool.begin().await?;

            let deleted = sqlx::query("DELETE FROM alert_notification WHERE org_id = ? AND id = ?")
                .bind(org_id)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if deleted == 0 {
                tx.rollback().await?;
                return Err(Error::not_found(NOTIFICATION_ENTITY, id.to_string()));
            }

            // State rows die with their channel.
            sqlx::query("DELETE FROM alert_notification_state WHERE org_id = ? AND notifier_id = ?")
                .bind(org_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn delete_config_by_uid(&self, org_id: i64, uid: &str) -> Result<i64> {
        let existing = self.get_config_by_uid(org_id, uid).await?;
        self.delete_config(org_id, existing.id).await?;
        Ok(existing.id)
    }

    async fn get_or_create_state(&self, key: NotificationStateKey) -> Result<AlertNotificationState> {
        retry_on_sqlite_busy("insert_alert_notification_state", || async {
            // The unique key lets exactly one racing insert win; the others read its row.
            sqlx::query(
                r#"
                INSERT INTO alert_notification_state (
                    org_id, alert_id, notifier_id, state, version, updated_at,
                    alert_rule_state_updated_version
                ) VALUES (?, ?, ?, ?, 0, ?, 0)
                ON CONFLICT (org_id, alert_id, notifier_id) DO NOTHING
                "#,
            )
            .bind(key.org_id)
            .bind(key.alert_id)
            .bind(key.notifier_id)
            .bind(NotificationStateKind::Unknown.to_string())
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        self.fetch_state(key)
            .await?
            .ok_or_else(|| Error::not_found(STATE_ENTITY, key.to_string()))?
            .try_into()
    }

    async fn set_state_pending(&self, cmd: SetStatePendingCommand) -> Result<AlertNotificationState> {
        let key = cmd.key;
        let row = retry_on_sqlite_busy("set_alert_notification_state_pending", || async {
            let row = sqlx::query_as::<_, AlertNotificationStateDbModel>(
                r#"
                UPDATE alert_notification_state SET
                    state = ?,
                    version = version + 1,
                    updated_at = ?,
                    alert_rule_state_updated_version = ?
                WHERE org_id = ? AND alert_id = ? AND notifier_id = ?
                    AND version = ?
                    AND alert_rule_state_updated_version <= ?
                RETURNING *
                "#,
            )
            .bind(NotificationStateKind::Pending.to_string())
            .bind(now_ms())
            .bind(cmd.alert_rule_state_updated_version)
            .bind(key.org_id)
            .bind(key.alert_id)
            .bind(key.notifier_id)
            .bind(cmd.version)
            .bind(cmd.alert_rule_state_updated_version)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.state_miss(key, cmd.version).await),
        }
    }

    async fn set_state_completed(&self, cmd: SetStateCompletedCommand) -> Result<AlertNotificationState> {
        let key = cmd.key;
        let row = retry_on_sqlite_busy("set_alert_notification_state_completed", || async {
            let row = sqlx::query_as::<_, AlertNotificationStateDbModel>(
                r#"
                UPDATE alert_notification_state SET
                    state = ?,
                    version = version + 1,
                    updated_at = ?
                WHERE org_id = ? AND alert_id = ? AND notifier_id = ? AND version = ?
                RETURNING *
                "#,
            )
            .bind(NotificationStateKind::Completed.to_string())
            .bind(now_ms())
            .bind(key.org_id)
            .bind(key.alert_id)
            .bind(key.notifier_id)
            .bind(cmd.version)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.state_miss(key, cmd.version).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_short_uid() {
        let uid = generate_short_uid();
        assert_eq!(uid.len(), GENERATED_UID_LENGTH);
        assert!(uid.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(uid, generate_short_uid());
    }
}
