//! Per (alert, notifier) delivery state.
//!
//! Every alert/channel pair owns one state row. Workers move it between
//! `Pending` and `Completed` by quoting the version they last observed; the
//! store applies the change as a single compare-and-set, so two overlapping
//! evaluation cycles can never both claim the same send.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::repositories::AlertNotificationStore;
use crate::{Error, Result};

/// Delivery state of one alert on one channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStateKind {
    /// Row created, no transition yet.
    Unknown,
    Pending,
    Completed,
}

/// Composite key of a notification state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationStateKey {
    pub org_id: i64,
    pub alert_id: i64,
    pub notifier_id: i64,
}

impl NotificationStateKey {
    pub fn new(org_id: i64, alert_id: i64, notifier_id: i64) -> Self {
        Self {
            org_id,
            alert_id,
            notifier_id,
        }
    }
}

impl fmt::Display for NotificationStateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org_id, self.alert_id, self.notifier_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertNotificationState {
    pub id: i64,
    pub org_id: i64,
    pub alert_id: i64,
    pub notifier_id: i64,
    pub state: NotificationStateKind,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    /// Version of the alert rule state that last moved this row to pending.
    pub alert_rule_state_updated_version: i64,
}

impl AlertNotificationState {
    pub fn key(&self) -> NotificationStateKey {
        NotificationStateKey::new(self.org_id, self.alert_id, self.notifier_id)
    }
}

/// Move a state row to `Pending`.
#[derive(Debug, Clone, Copy)]
pub struct SetStatePendingCommand {
    pub key: NotificationStateKey,
    /// Version the caller last observed.
    pub version: i64,
    /// Rejected when older than the marker already stored.
    pub alert_rule_state_updated_version: i64,
}

/// Move a state row to `Completed`.
#[derive(Debug, Clone, Copy)]
pub struct SetStateCompletedCommand {
    pub key: NotificationStateKey,
    /// Version the caller last observed.
    pub version: i64,
}

/// Enforces the version-gated lifecycle of notification state rows.
#[derive(Clone)]
pub struct NotificationStateTracker {
    store: Arc<dyn AlertNotificationStore>,
}

impl NotificationStateTracker {
    pub fn new(store: Arc<dyn AlertNotificationStore>) -> Self {
        Self { store }
    }

    /// Return the state row for `key`, creating it at version 0 if absent.
    pub async fn get_or_create(&self, key: NotificationStateKey) -> Result<AlertNotificationState> {
        let state = self.store.get_or_create_state(key).await?;
        debug!(key = %key, state = %state.state, version = state.version, "Loaded notification state");
        Ok(state)
    }

    /// Transition to `Pending` if the stored version still equals `cmd.version`.
    pub async fn to_pending(&self, cmd: SetStatePendingCommand) -> Result<AlertNotificationState> {
        check_version(cmd.key, cmd.version)?;
        let result = self.store.set_state_pending(cmd).await;
        log_transition(cmd.key, NotificationStateKind::Pending, cmd.version, &result);
        result
    }

    /// Transition to `Completed` if the stored version still equals `cmd.version`.
    pub async fn to_completed(
        &self,
        cmd: SetStateCompletedCommand,
    ) -> Result<AlertNotificationState> {
        check_version(cmd.key, cmd.version)?;
        let result = self.store.set_state_completed(cmd).await;
        log_transition(cmd.key, NotificationStateKind::Completed, cmd.version, &result);
        result
    }
}

fn check_version(key: NotificationStateKey, version: i64) -> Result<()> {
    if version < 0 {
        return Err(Error::validation(format!(
            "invalid notification state version {} for {}",
            version, key
        )));
    }
    Ok(())
}

fn log_transition(
    key: NotificationStateKey,
    target: NotificationStateKind,
    expected: i64,
    result: &Result<AlertNotificationState>,
) {
    match result {
        Ok(state) => debug!(
            key = %key,
            state = %target,
            version = state.version,
            "Notification state transitioned"
        ),
        Err(e) if e.is_version_conflict() => warn!(
            key = %key,
            state = %target,
            expected,
            "Notification state changed concurrently; transition rejected"
        ),
        Err(e) => warn!(key = %key, state = %target, error = %e, "Notification state transition failed"),
    }
}
