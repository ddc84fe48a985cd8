//! Discord webhook notifier.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{Notifier, NotifierBase, parse_http_url};
use crate::encryption::SecretsAccessor;
use crate::notification::events::{AlertEvent, AlertState};
use crate::notification::models::AlertNotification;
use crate::notification::registry::{NotifierOption, NotifierPlugin};
use crate::notification::sender::{NotificationSender, WebhookMessage};
use crate::notification::state::AlertNotificationState;
use crate::{Error, Result};

pub const NOTIFIER_TYPE: &str = "discord";

const DEFAULT_USERNAME: &str = "alert-notify";

pub(crate) fn plugin() -> NotifierPlugin {
    NotifierPlugin::new(
        NOTIFIER_TYPE,
        "Discord",
        "Sends notifications to Discord",
        "Discord settings",
        vec![
            NotifierOption::text("content", "Message Content", "Mention a group using @ or a user using <@ID>"),
            NotifierOption::password("url", "Webhook URL", "Discord webhook URL").required(),
            NotifierOption::text("avatar_url", "Avatar URL", ""),
            NotifierOption::checkbox(
                "use_discord_username",
                "Use Discord's Webhook Username",
                "Use the username configured in Discord's webhook settings",
            ),
        ],
        build,
    )
}

fn build(
    config: &AlertNotification,
    secrets: &dyn SecretsAccessor,
    sender: Arc<dyn NotificationSender>,
) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(DiscordNotifier::from_config(config, secrets, sender)?))
}

/// Posts alert embeds to a Discord webhook.
pub struct DiscordNotifier {
    base: NotifierBase,
    webhook_url: String,
    pub content: Option<String>,
    pub avatar_url: Option<String>,
    pub use_discord_username: bool,
    sender: Arc<dyn NotificationSender>,
}

impl DiscordNotifier {
    pub fn from_config(
        config: &AlertNotification,
        secrets: &dyn SecretsAccessor,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<Self> {
        let webhook_url = secrets.value_or("url", config.setting_str("url").unwrap_or(""));
        let webhook_url = webhook_url.trim();
        if webhook_url.is_empty() {
            return Err(Error::validation("Could not find url property in settings"));
        }
        parse_http_url("url", webhook_url)?;

        let optional = |key: &str| {
            config
                .setting_str(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            base: NotifierBase::new(config),
            webhook_url: webhook_url.to_string(),
            content: optional("content"),
            avatar_url: optional("avatar_url"),
            use_discord_username: config.setting_bool("use_discord_username"),
            sender,
        })
    }

    /// Webhook URL. May come from secure settings, so keep it out of logs.
    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Embed color for the alert state.
    fn get_color(state: AlertState) -> u32 {
        match state {
            AlertState::Alerting => 0xe74c3c,               // Red
            AlertState::Ok => 0x2ecc71,                     // Green
            AlertState::NoData | AlertState::Unknown => 0x808080, // Gray
            AlertState::Pending | AlertState::Paused => 0xf39c12, // Orange
        }
    }

    fn build_payload(&self, event: &AlertEvent) -> Value {
        let fields: Vec<Value> = event
            .eval_matches
            .iter()
            .map(|m| {
                json!({
                    "name": m.metric,
                    "value": m.value.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string()),
                    "inline": true
                })
            })
            .collect();

        let mut embed = json!({
            "title": event.title(),
            "description": event.message,
            "color": Self::get_color(event.state),
            "timestamp": event.timestamp.to_rfc3339(),
            "fields": fields,
            "footer": { "text": format!("Rule: {}", event.rule_name) }
        });
        if let Some(rule_url) = &event.rule_url {
            embed["url"] = json!(rule_url);
        }
        if let Some(image_url) = &event.image_url {
            embed["image"] = json!({ "url": image_url });
        }

        let mut payload = json!({ "embeds": [embed] });

        if !self.use_discord_username {
            payload["username"] = json!(DEFAULT_USERNAME);
        }
        if let Some(content) = &self.content {
            payload["content"] = json!(content);
        }
        if let Some(avatar_url) = &self.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn notifier_type(&self) -> &str {
        &self.base.notifier_type
    }

    fn uid(&self) -> &str {
        &self.base.uid
    }

    fn notifier_id(&self) -> i64 {
        self.base.id
    }

    fn is_default(&self) -> bool {
        self.base.is_default
    }

    fn send_reminder(&self) -> bool {
        self.base.send_reminder
    }

    fn frequency(&self) -> Duration {
        self.base.frequency
    }

    fn disable_resolve_message(&self) -> bool {
        self.base.disable_resolve_message
    }

    fn should_notify(&self, event: &AlertEvent, state: &AlertNotificationState) -> bool {
        self.base.should_notify(event, state)
    }

    async fn send(&self, event: &AlertEvent) -> Result<()> {
        debug!(notifier = %self.base.name, rule_id = event.rule_id, "Sending Discord notification");
        let message = WebhookMessage::post(&self.webhook_url, self.build_payload(event));
        self.sender.send_webhook(message).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
