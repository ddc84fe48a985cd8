//! Notifier implementations.
//!
//! Each channel type provides a constructor that validates a stored
//! [`AlertNotification`] and produces a [`Notifier`]:
//! - Google Chat incoming webhooks
//! - Discord webhooks
//! - Generic webhooks (HTTP POST/PUT)

mod discord;
mod googlechat;
mod webhook;

pub use discord::DiscordNotifier;
pub use googlechat::GoogleChatNotifier;
pub use webhook::WebhookNotifier;

pub(crate) use discord::plugin as discord_plugin;
pub(crate) use googlechat::plugin as googlechat_plugin;
pub(crate) use webhook::plugin as webhook_plugin;

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use super::events::{AlertEvent, AlertState};
use super::models::AlertNotification;
use super::state::{AlertNotificationState, NotificationStateKind};
use crate::{Error, Result};

/// A pending send younger than this is assumed to be in flight elsewhere.
const PENDING_SEND_GRACE: Duration = Duration::from_secs(60);

/// A validated, ready-to-send notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notifier_type(&self) -> &str;

    fn uid(&self) -> &str;

    fn notifier_id(&self) -> i64;

    fn is_default(&self) -> bool;

    fn send_reminder(&self) -> bool;

    fn frequency(&self) -> Duration;

    fn disable_resolve_message(&self) -> bool;

    /// Whether `event` should be delivered given the channel's delivery state.
    fn should_notify(&self, event: &AlertEvent, state: &AlertNotificationState) -> bool;

    /// Deliver the event.
    async fn send(&self, event: &AlertEvent) -> Result<()>;

    /// Allows downcasting to the concrete notifier.
    fn as_any(&self) -> &dyn Any;
}

/// Fields shared by every notifier, with the reminder/resolve filter.
#[derive(Debug, Clone)]
pub struct NotifierBase {
    pub id: i64,
    pub uid: String,
    pub name: String,
    pub notifier_type: String,
    pub is_default: bool,
    pub send_reminder: bool,
    pub frequency: Duration,
    pub disable_resolve_message: bool,
}

impl NotifierBase {
    pub fn new(config: &AlertNotification) -> Self {
        Self {
            id: config.id,
            uid: config.uid.clone(),
            name: config.name.clone(),
            notifier_type: config.notifier_type.clone(),
            is_default: config.is_default,
            send_reminder: config.send_reminder,
            frequency: config.frequency,
            disable_resolve_message: config.disable_resolve_message,
        }
    }

    pub fn should_notify(&self, event: &AlertEvent, state: &AlertNotificationState) -> bool {
        self.should_notify_at(event, state, Utc::now())
    }

    pub fn should_notify_at(
        &self,
        event: &AlertEvent,
        state: &AlertNotificationState,
        now: DateTime<Utc>,
    ) -> bool {
        let prev = event.prev_state;
        let current = event.state;

        if prev == current {
            if !self.send_reminder {
                return false;
            }
            // Reminders are only sent for firing states.
            if matches!(current, AlertState::Ok | AlertState::Pending) {
                return false;
            }
            if state.state == NotificationStateKind::Completed
                && !elapsed_since(state.updated_at, now, self.frequency)
            {
                return false;
            }
        }

        match (prev, current) {
            (AlertState::Unknown, AlertState::Ok | AlertState::Pending) => return false,
            (AlertState::Pending, AlertState::Ok) => return false,
            (AlertState::Ok, AlertState::Pending) => return false,
            _ => {}
        }

        if current == AlertState::Ok && self.disable_resolve_message {
            return false;
        }

        if state.state == NotificationStateKind::Pending
            && !elapsed_since(state.updated_at, now, PENDING_SEND_GRACE)
        {
            return false;
        }

        true
    }
}

/// True once at least `period` has passed between `since` and `now`.
fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>, period: Duration) -> bool {
    match chrono::Duration::from_std(period) {
        Ok(period) => since
            .checked_add_signed(period)
            .is_none_or(|deadline| deadline <= now),
        Err(_) => false,
    }
}

/// Read a required, non-blank plain string setting.
pub(crate) fn required_setting<'a>(config: &'a AlertNotification, key: &str) -> Result<&'a str> {
    match config.setting_str(key).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::validation(format!(
            "Could not find {} property in settings",
            key
        ))),
    }
}

/// Require an absolute http(s) URL.
pub(crate) fn parse_http_url(key: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::validation(format!("invalid {} '{}': {}", key, raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::validation(format!(
            "invalid {} '{}': unsupported scheme {}",
            key, raw, scheme
        ))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;

    use crate::Result;
    use crate::notification::models::AlertNotification;
    use crate::notification::sender::{NotificationSender, WebhookMessage};

    /// Sender that records messages instead of delivering them.
    #[derive(Default)]
    pub struct RecordingSender {
        pub messages: Mutex<Vec<WebhookMessage>>,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send_webhook(&self, message: WebhookMessage) -> Result<()> {
            self.messages.lock().push(message);
            Ok(())
        }
    }

    pub fn recording_sender() -> Arc<RecordingSender> {
        Arc::new(RecordingSender::default())
    }

    pub fn config(notifier_type: &str, settings: Value) -> AlertNotification {
        AlertNotification {
            id: 1,
            uid: "abc".to_string(),
            org_id: 1,
            name: "ops".to_string(),
            notifier_type: notifier_type.to_string(),
            settings,
            secure_settings: None,
            is_default: false,
            send_reminder: false,
            frequency: std::time::Duration::ZERO,
            disable_resolve_message: false,
            version: 0,
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
        }
    }
}
