//! Alert notification service.
//!
//! Front door for channel configuration and delivery state. Every write of a
//! channel config is validated by constructing its notifier first; a config
//! whose constructor fails is never persisted.
//!
//! Cancellation is honoured up to the point a store write is issued. Once a
//! write has started it runs to completion and its outcome is returned, so
//! the caller never sees `Cancelled` for a change that was committed.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::channels::Notifier;
use super::models::{
    AlertNotification, AlertNotificationUpdate, CreateAlertNotificationCommand,
    DeleteAlertNotificationCommand, DeleteAlertNotificationWithUidCommand, MAX_UID_LENGTH,
    NewAlertNotification, RekeyUidCommand, UpdateAlertNotificationCommand,
    UpdateAlertNotificationWithUidCommand, frequency_to_secs,
};
use super::registry::{NotifierPlugin, NotifierRegistry};
use super::sender::NotificationSender;
use super::state::{
    AlertNotificationState, NotificationStateKey, NotificationStateTracker,
    SetStateCompletedCommand, SetStatePendingCommand,
};
use crate::database::repositories::AlertNotificationStore;
use crate::encryption::{DecryptedSecrets, SecretsAccessor, SecureSettingsCodec};
use crate::{Error, Result};

const NOTIFICATION_ENTITY: &str = "AlertNotification";

/// Reject uids longer than [`MAX_UID_LENGTH`] characters.
pub fn validate_uid(uid: &str) -> Result<()> {
    if uid.chars().count() > MAX_UID_LENGTH {
        return Err(Error::validation(format!(
            "Invalid UID: Must be {} characters or less",
            MAX_UID_LENGTH
        )));
    }
    Ok(())
}

/// Run `fut` unless `token` is cancelled first. Only for reads and codec work:
/// dropping a store write mid-flight does not undo it.
async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

fn ensure_not_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Channel configuration and delivery-state operations.
pub struct AlertNotificationService {
    store: Arc<dyn AlertNotificationStore>,
    codec: SecureSettingsCodec,
    registry: Arc<NotifierRegistry>,
    sender: Arc<dyn NotificationSender>,
    state: NotificationStateTracker,
}

impl AlertNotificationService {
    pub fn new(
        store: Arc<dyn AlertNotificationStore>,
        codec: SecureSettingsCodec,
        registry: Arc<NotifierRegistry>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        let state = NotificationStateTracker::new(store.clone());
        Self {
            store,
            codec,
            registry,
            sender,
            state,
        }
    }

    pub fn registry(&self) -> &Arc<NotifierRegistry> {
        &self.registry
    }

    /// Construct and drop a notifier; the construction result is the verdict.
    fn validate(&self, config: &AlertNotification, secrets: &dyn SecretsAccessor) -> Result<()> {
        self.registry
            .build(config, secrets, self.sender.clone())
            .map(drop)
            .inspect_err(|e| {
                debug!(
                    name = %config.name,
                    notifier_type = %config.notifier_type,
                    error = %e,
                    "Alert notification rejected"
                )
            })
    }

    fn not_found(id: impl std::fmt::Display) -> Error {
        Error::not_found(
            NOTIFICATION_ENTITY,
            format!("{}: unable to find the alert notification", id),
        )
    }

    // ========== Channel configuration ==========

    /// Validate and store a new channel.
    #[instrument(skip(self, cmd, token), fields(org_id = cmd.org_id, name = %cmd.name, notifier_type = %cmd.notifier_type))]
    pub async fn create_config(
        &self,
        cmd: CreateAlertNotificationCommand,
        token: &CancellationToken,
    ) -> Result<AlertNotification> {
        validate_uid(&cmd.uid)?;
        frequency_to_secs(cmd.frequency)?;
        ensure_not_cancelled(token)?;

        let encrypted = cancellable(token, self.codec.encrypt(&cmd.secure_settings)).await?;
        let secrets = DecryptedSecrets::new(cmd.secure_settings);

        let now = Utc::now();
        let candidate = AlertNotification {
            id: 0,
            uid: cmd.uid,
            org_id: cmd.org_id,
            name: cmd.name,
            notifier_type: cmd.notifier_type,
            settings: cmd.settings,
            secure_settings: Some(encrypted),
            is_default: cmd.is_default,
            send_reminder: cmd.send_reminder,
            frequency: cmd.frequency,
            disable_resolve_message: cmd.disable_resolve_message,
            version: 0,
            created: now,
            updated: now,
        };
        self.validate(&candidate, &secrets)?;

        let new = NewAlertNotification {
            uid: candidate.uid,
            org_id: candidate.org_id,
            name: candidate.name,
            notifier_type: candidate.notifier_type,
            settings: candidate.settings,
            secure_settings: candidate.secure_settings.unwrap_or_default(),
            is_default: candidate.is_default,
            send_reminder: candidate.send_reminder,
            frequency: candidate.frequency,
            disable_resolve_message: candidate.disable_resolve_message,
        };

        ensure_not_cancelled(token)?;
        let created = self.store.insert_config(&new).await?;
        info!(id = created.id, uid = %created.uid, "Created alert notification");
        Ok(created)
    }

    /// Validate and store an update, merging secure settings into the stored ones.
    ///
    /// Secure keys omitted from the command keep their stored values. The
    /// write is rejected with [`Error::VersionConflict`] if another update
    /// landed after the stored config was read.
    #[instrument(skip(self, cmd, token), fields(org_id = cmd.org_id, id = cmd.id))]
    pub async fn update_config(
        &self,
        cmd: UpdateAlertNotificationCommand,
        token: &CancellationToken,
    ) -> Result<AlertNotification> {
        validate_uid(&cmd.uid)?;
        if cmd.id <= 0 {
            return Err(Error::validation("alert notification id is required for update"));
        }
        frequency_to_secs(cmd.frequency)?;
        ensure_not_cancelled(token)?;

        let existing = cancellable(token, self.store.get_config(cmd.org_id, cmd.id))
            .await
            .map_err(|e| if e.is_not_found() { Self::not_found(cmd.id) } else { e })?;

        if !cmd.uid.is_empty() && cmd.uid != existing.uid {
            return Err(Error::validation(format!(
                "uid of alert notification {} cannot be changed by an update; rekey it instead",
                cmd.id
            )));
        }

        let (secrets, encrypted) = cancellable(
            token,
            self.codec
                .merge(existing.secure_settings.as_deref(), &cmd.secure_settings),
        )
        .await?;

        let candidate = AlertNotification {
            id: existing.id,
            uid: existing.uid,
            org_id: existing.org_id,
            name: cmd.name,
            notifier_type: cmd.notifier_type,
            settings: cmd.settings,
            secure_settings: Some(encrypted),
            is_default: cmd.is_default,
            send_reminder: cmd.send_reminder,
            frequency: cmd.frequency,
            disable_resolve_message: cmd.disable_resolve_message,
            version: existing.version,
            created: existing.created,
            updated: Utc::now(),
        };
        self.validate(&candidate, &secrets)?;

        let update = AlertNotificationUpdate {
            id: candidate.id,
            org_id: candidate.org_id,
            expected_version: existing.version,
            name: candidate.name,
            notifier_type: candidate.notifier_type,
            settings: candidate.settings,
            secure_settings: candidate.secure_settings.unwrap_or_default(),
            is_default: candidate.is_default,
            send_reminder: candidate.send_reminder,
            frequency: candidate.frequency,
            disable_resolve_message: candidate.disable_resolve_message,
        };

        ensure_not_cancelled(token)?;
        let updated = self.store.update_config(&update).await?;
        info!(uid = %updated.uid, version = updated.version, "Updated alert notification");
        Ok(updated)
    }

    /// Update a channel addressed by uid.
    #[instrument(skip(self, cmd, token), fields(org_id = cmd.org_id, uid = %cmd.uid))]
    pub async fn update_config_by_uid(
        &self,
        cmd: UpdateAlertNotificationWithUidCommand,
        token: &CancellationToken,
    ) -> Result<AlertNotification> {
        validate_uid(&cmd.uid)?;
        ensure_not_cancelled(token)?;

        let existing = cancellable(token, self.store.get_config_by_uid(cmd.org_id, &cmd.uid))
            .await
            .map_err(|e| if e.is_not_found() { Self::not_found(&cmd.uid) } else { e })?;

        self.update_config(cmd.into_update(existing.id), token).await
    }

    /// Move a channel to a new uid.
    #[instrument(skip(self, cmd, token), fields(org_id = cmd.org_id, uid = %cmd.uid, new_uid = %cmd.new_uid))]
    pub async fn rekey_uid(
        &self,
        cmd: RekeyUidCommand,
        token: &CancellationToken,
    ) -> Result<AlertNotification> {
        validate_uid(&cmd.uid)?;
        validate_uid(&cmd.new_uid)?;
        if cmd.new_uid.trim().is_empty() {
            return Err(Error::validation("new uid must not be empty"));
        }
        ensure_not_cancelled(token)?;

        let updated = self
            .store
            .update_config_uid(cmd.org_id, &cmd.uid, &cmd.new_uid)
            .await?;
        info!(id = updated.id, "Rekeyed alert notification");
        Ok(updated)
    }

    #[instrument(skip(self, token))]
    pub async fn delete_config(
        &self,
        cmd: DeleteAlertNotificationCommand,
        token: &CancellationToken,
    ) -> Result<()> {
        ensure_not_cancelled(token)?;
        self.store.delete_config(cmd.org_id, cmd.id).await?;
        info!("Deleted alert notification");
        Ok(())
    }

    /// Delete a channel by uid, returning its id.
    #[instrument(skip(self, token))]
    pub async fn delete_config_by_uid(
        &self,
        cmd: DeleteAlertNotificationWithUidCommand,
        token: &CancellationToken,
    ) -> Result<i64> {
        validate_uid(&cmd.uid)?;
        ensure_not_cancelled(token)?;
        let id = self.store.delete_config_by_uid(cmd.org_id, &cmd.uid).await?;
        info!(id, "Deleted alert notification");
        Ok(id)
    }

    pub async fn list_configs(
        &self,
        org_id: i64,
        token: &CancellationToken,
    ) -> Result<Vec<AlertNotification>> {
        cancellable(token, self.store.list_configs(org_id)).await
    }

    pub async fn get_config(
        &self,
        org_id: i64,
        id: i64,
        token: &CancellationToken,
    ) -> Result<AlertNotification> {
        cancellable(token, self.store.get_config(org_id, id)).await
    }

    pub async fn get_config_by_uid(
        &self,
        org_id: i64,
        uid: &str,
        token: &CancellationToken,
    ) -> Result<AlertNotification> {
        validate_uid(uid)?;
        cancellable(token, self.store.get_config_by_uid(org_id, uid)).await
    }

    pub async fn get_config_by_name(
        &self,
        org_id: i64,
        name: &str,
        token: &CancellationToken,
    ) -> Result<AlertNotification> {
        cancellable(token, self.store.get_config_by_name(org_id, name)).await
    }

    /// Channels an alert should be sent to: those listed by uid plus every default channel.
    pub async fn configs_to_send(
        &self,
        org_id: i64,
        uids: &[String],
        token: &CancellationToken,
    ) -> Result<Vec<AlertNotification>> {
        for uid in uids {
            validate_uid(uid)?;
        }
        cancellable(token, self.store.list_configs_to_send(org_id, uids)).await
    }

    /// Fresh notifiers for [`configs_to_send`](Self::configs_to_send).
    ///
    /// A channel that fails to decrypt or construct is logged and skipped.
    #[instrument(skip(self, uids, token), fields(uids = uids.len()))]
    pub async fn notifiers_to_send(
        &self,
        org_id: i64,
        uids: &[String],
        token: &CancellationToken,
    ) -> Result<Vec<Box<dyn Notifier>>> {
        let configs = self.configs_to_send(org_id, uids, token).await?;
        let mut notifiers = Vec::with_capacity(configs.len());

        for config in configs {
            let secrets = match cancellable(
                token,
                self.codec.decrypt(config.secure_settings.as_deref()),
            )
            .await
            {
                Ok(secrets) => DecryptedSecrets::new(secrets),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(uid = %config.uid, error = %e, "Could not decrypt secure settings; skipping channel");
                    continue;
                }
            };

            match self.registry.build(&config, &secrets, self.sender.clone()) {
                Ok(notifier) => notifiers.push(notifier),
                Err(e) => {
                    warn!(uid = %config.uid, notifier_type = %config.notifier_type, error = %e, "Could not build notifier; skipping channel")
                }
            }
        }

        Ok(notifiers)
    }

    /// Decrypted secure value of `field`, or `fallback` when the channel has none.
    pub async fn decrypted_value(
        &self,
        config: &AlertNotification,
        field: &str,
        fallback: &str,
        token: &CancellationToken,
    ) -> Result<String> {
        let value = cancellable(
            token,
            self.codec
                .decrypt_field(config.secure_settings.as_deref(), field),
        )
        .await?;
        Ok(value.unwrap_or_else(|| fallback.to_string()))
    }

    /// Descriptors of every registered notifier type.
    pub fn available_notifiers(&self) -> Vec<NotifierPlugin> {
        self.registry.plugins()
    }

    // ========== Delivery state ==========

    pub async fn get_or_create_notification_state(
        &self,
        key: NotificationStateKey,
        token: &CancellationToken,
    ) -> Result<AlertNotificationState> {
        ensure_not_cancelled(token)?;
        self.state.get_or_create(key).await
    }

    /// Claim a send. Fails with [`Error::VersionConflict`] if someone else moved first.
    pub async fn mark_pending(
        &self,
        cmd: SetStatePendingCommand,
        token: &CancellationToken,
    ) -> Result<AlertNotificationState> {
        ensure_not_cancelled(token)?;
        self.state.to_pending(cmd).await
    }

    pub async fn mark_completed(
        &self,
        cmd: SetStateCompletedCommand,
        token: &CancellationToken,
    ) -> Result<AlertNotificationState> {
        ensure_not_cancelled(token)?;
        self.state.to_completed(cmd).await
    }
}
