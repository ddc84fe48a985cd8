//! Google Chat incoming-webhook notifier.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{Notifier, NotifierBase, parse_http_url, required_setting};
use crate::Result;
use crate::encryption::SecretsAccessor;
use crate::notification::events::AlertEvent;
use crate::notification::models::AlertNotification;
use crate::notification::registry::{NotifierOption, NotifierPlugin};
use crate::notification::sender::{NotificationSender, WebhookMessage};
use crate::notification::state::AlertNotificationState;

pub const NOTIFIER_TYPE: &str = "googlechat";

pub(crate) fn plugin() -> NotifierPlugin {
    NotifierPlugin::new(
        NOTIFIER_TYPE,
        "Google Hangouts Chat",
        "Sends notifications to Google Hangouts Chat via webhooks based on the official JSON message format",
        "Google Hangouts Chat settings",
        vec![NotifierOption::text("url", "Url", "Google Hangouts Chat incoming webhook url").required()],
        build,
    )
}

fn build(
    config: &AlertNotification,
    secrets: &dyn SecretsAccessor,
    sender: Arc<dyn NotificationSender>,
) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(GoogleChatNotifier::from_config(config, secrets, sender)?))
}

/// Posts alert cards to a Google Chat space.
pub struct GoogleChatNotifier {
    base: NotifierBase,
    /// Incoming webhook URL, exactly as configured.
    pub url: String,
    sender: Arc<dyn NotificationSender>,
}

impl GoogleChatNotifier {
    pub fn from_config(
        config: &AlertNotification,
        _secrets: &dyn SecretsAccessor,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<Self> {
        let url = required_setting(config, "url")?;
        parse_http_url("url", url)?;

        Ok(Self {
            base: NotifierBase::new(config),
            url: url.to_string(),
            sender,
        })
    }

    fn build_payload(&self, event: &AlertEvent) -> Value {
        let title = event.title();
        let mut widgets = Vec::new();

        if !event.message.is_empty() {
            widgets.push(json!({ "textParagraph": { "text": event.message } }));
        }

        for m in &event.eval_matches {
            let value = m
                .value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            widgets.push(json!({
                "keyValue": { "topLabel": m.metric, "content": value }
            }));
        }

        if let Some(image_url) = &event.image_url {
            widgets.push(json!({ "image": { "imageUrl": image_url } }));
        }

        if let Some(rule_url) = &event.rule_url {
            widgets.push(json!({
                "buttons": [{
                    "textButton": {
                        "text": "VIEW ALERT RULE",
                        "onClick": { "openLink": { "url": rule_url } }
                    }
                }]
            }));
        }

        widgets.push(json!({
            "textParagraph": { "text": format!("{} UTC", event.timestamp.format("%Y-%m-%d %H:%M:%S")) }
        }));

        json!({
            "previewText": title,
            "fallbackText": title,
            "cards": [{
                "header": { "title": title },
                "sections": [{ "widgets": widgets }]
            }]
        })
    }
}

#[async_trait]
impl Notifier for GoogleChatNotifier {
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
        debug!(notifier = %self.base.name, rule_id = event.rule_id, "Sending Google Chat notification");
        let message = WebhookMessage::post(&self.url, self.build_payload(event));
        self.sender.send_webhook(message).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::DecryptedSecrets;
    use crate::notification::channels::test_support::{config, recording_sender};
    use crate::notification::events::AlertState;

    #[test]
    fn test_empty_settings_rejected() {
        let err = GoogleChatNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({})),
            &DecryptedSecrets::default(),
            recording_sender(),
        )
        .err()
        .unwrap();
        assert!(err.is_validation());
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_valid_settings() {
        let notifier = GoogleChatNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({ "url": "http://google.com" })),
            &DecryptedSecrets::default(),
            recording_sender(),
        )
        .unwrap();
        assert_eq!(notifier.name(), "ops");
        assert_eq!(notifier.notifier_type(), "googlechat");
        assert_eq!(notifier.url, "http://google.com");
    }

    #[test]
    fn test_relative_url_rejected() {
        let result = GoogleChatNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({ "url": "/hooks/abc" })),
            &DecryptedSecrets::default(),
            recording_sender(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_send_builds_card() {
        let sender = recording_sender();
        let notifier = GoogleChatNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({ "url": "http://google.com" })),
            &DecryptedSecrets::default(),
            sender.clone(),
        )
        .unwrap();

        let event = AlertEvent::new(1, 10, "CPU high", AlertState::Ok, AlertState::Alerting)
            .with_message("cpu above 90%")
            .with_eval_match("host-1", Some(97.5))
            .with_rule_url("http://alerts.local/rules/abc");
        notifier.send(&event).await.unwrap();

        let messages = sender.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].url, "http://google.com");
        let body = &messages[0].body;
        assert_eq!(body["previewText"], "[Alerting] CPU high");
        let widgets = body["cards"][0]["sections"][0]["widgets"].as_array().unwrap();
        assert_eq!(widgets[0]["textParagraph"]["text"], "cpu above 90%");
        assert_eq!(widgets[1]["keyValue"]["topLabel"], "host-1");
        assert_eq!(
            widgets[2]["buttons"][0]["textButton"]["onClick"]["openLink"]["url"],
            "http://alerts.local/rules/abc"
        );
    }
}
