//! Generic webhook notifier.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{Notifier, NotifierBase, parse_http_url, required_setting};
use crate::encryption::SecretsAccessor;
use crate::notification::events::AlertEvent;
use crate::notification::models::AlertNotification;
use crate::notification::registry::{NotifierOption, NotifierPlugin};
use crate::notification::sender::{HttpMethod, NotificationSender, WebhookMessage};
use crate::notification::state::AlertNotificationState;
use crate::{Error, Result};

pub const NOTIFIER_TYPE: &str = "webhook";

pub(crate) fn plugin() -> NotifierPlugin {
    NotifierPlugin::new(
        NOTIFIER_TYPE,
        "webhook",
        "Sends HTTP POST request to a URL",
        "Webhook settings",
        vec![
            NotifierOption::text("url", "Url", "").required(),
            NotifierOption::select("httpMethod", "Http Method", "", &["POST", "PUT"]),
            NotifierOption::text("username", "Username", ""),
            NotifierOption::password("password", "Password", ""),
        ],
        build,
    )
}

fn build(
    config: &AlertNotification,
    secrets: &dyn SecretsAccessor,
    sender: Arc<dyn NotificationSender>,
) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(WebhookNotifier::from_config(config, secrets, sender)?))
}

/// Posts the alert as JSON to an arbitrary endpoint.
pub struct WebhookNotifier {
    base: NotifierBase,
    pub url: String,
    pub method: HttpMethod,
    pub username: Option<String>,
    password: Option<String>,
    sender: Arc<dyn NotificationSender>,
}

impl WebhookNotifier {
    pub fn from_config(
        config: &AlertNotification,
        secrets: &dyn SecretsAccessor,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<Self> {
        let url = required_setting(config, "url")?;
        parse_http_url("url", url)?;

        let method = match config.setting_str("httpMethod").map(str::trim) {
            None | Some("") => HttpMethod::Post,
            Some(raw) => raw
                .parse::<HttpMethod>()
                .map_err(|_| Error::validation(format!("unsupported httpMethod '{}'", raw)))?,
        };

        let username = config
            .setting_str("username")
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let password = Some(secrets.value_or("password", config.setting_str("password").unwrap_or("")))
            .filter(|p| !p.is_empty());

        Ok(Self {
            base: NotifierBase::new(config),
            url: url.to_string(),
            method,
            username,
            password,
            sender,
        })
    }

    fn build_payload(&self, event: &AlertEvent) -> Value {
        let eval_matches: Vec<Value> = event
            .eval_matches
            .iter()
            .map(|m| json!({ "metric": m.metric, "value": m.value }))
            .collect();

        let mut payload = json!({
            "title": event.title(),
            "ruleId": event.rule_id,
            "ruleName": event.rule_name,
            "state": event.state.to_string(),
            "evalMatches": eval_matches,
            "orgId": event.org_id,
            "message": event.message,
        });

        if let Some(rule_url) = &event.rule_url {
            payload["ruleUrl"] = json!(rule_url);
        }
        if let Some(image_url) = &event.image_url {
            payload["imageUrl"] = json!(image_url);
        }

        payload
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
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
        debug!(notifier = %self.base.name, method = %self.method, "Sending webhook notification");
        let message = WebhookMessage {
            url: self.url.clone(),
            method: self.method,
            body: self.build_payload(event),
            username: self.username.clone(),
            password: self.password.clone(),
        };
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

    fn secrets(pairs: &[(&str, &str)]) -> DecryptedSecrets {
        DecryptedSecrets::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_missing_url_rejected() {
        let result = WebhookNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({ "httpMethod": "POST" })),
            &secrets(&[]),
            recording_sender(),
        );
        assert!(result.err().unwrap().to_string().contains("url"));
    }

    #[test]
    fn test_unsupported_method_rejected() {
        let result = WebhookNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({ "url": "http://hooks.local", "httpMethod": "DELETE" })),
            &secrets(&[]),
            recording_sender(),
        );
        assert!(result.err().unwrap().is_validation());
    }

    #[test]
    fn test_secure_password_wins_over_plain() {
        let notifier = WebhookNotifier::from_config(
            &config(
                NOTIFIER_TYPE,
                json!({ "url": "http://hooks.local", "httpMethod": "put", "username": "u", "password": "plain" }),
            ),
            &secrets(&[("password", "secure")]),
            recording_sender(),
        )
        .unwrap();
        assert_eq!(notifier.method, HttpMethod::Put);
        assert_eq!(notifier.username.as_deref(), Some("u"));
        assert_eq!(notifier.password.as_deref(), Some("secure"));
    }

    #[test]
    fn test_plain_password_fallback() {
        let notifier = WebhookNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({ "url": "http://hooks.local", "password": "plain" })),
            &secrets(&[]),
            recording_sender(),
        )
        .unwrap();
        assert_eq!(notifier.method, HttpMethod::Post);
        assert_eq!(notifier.password.as_deref(), Some("plain"));
    }

    #[tokio::test]
    async fn test_send_payload() {
        let sender = recording_sender();
        let notifier = WebhookNotifier::from_config(
            &config(NOTIFIER_TYPE, json!({ "url": "http://hooks.local/alert" })),
            &secrets(&[]),
            sender.clone(),
        )
        .unwrap();

        let event = AlertEvent::new(3, 42, "Disk full", AlertState::Ok, AlertState::Alerting)
            .with_eval_match("sda1", Some(99.0));
        notifier.send(&event).await.unwrap();

        let messages = sender.messages.lock();
        let body = &messages[0].body;
        assert_eq!(messages[0].url, "http://hooks.local/alert");
        assert_eq!(body["ruleId"], 42);
        assert_eq!(body["state"], "alerting");
        assert_eq!(body["evalMatches"][0]["metric"], "sda1");
        assert!(body.get("ruleUrl").is_none());
    }
}
