//! Outbound notification transport.
//!
//! Notifiers build a [`WebhookMessage`] and hand it to a
//! [`NotificationSender`]; only the sender talks HTTP.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::utils::http_client::build_notification_client;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
}

/// A JSON request to a webhook endpoint.
#[derive(Clone)]
pub struct WebhookMessage {
    pub url: String,
    pub method: HttpMethod,
    pub body: Value,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl WebhookMessage {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            body,
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for WebhookMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookMessage")
            .field("method", &self.method)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Delivers webhook messages.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_webhook(&self, message: WebhookMessage) -> Result<()>;
}

/// [`NotificationSender`] over reqwest.
pub struct HttpNotificationSender {
    client: Client,
}

impl HttpNotificationSender {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_notification_client(request_timeout)?,
        })
    }

    fn build_request(&self, message: &WebhookMessage) -> reqwest::RequestBuilder {
        let mut request = match message.method {
            HttpMethod::Post => self.client.post(&message.url),
            HttpMethod::Put => self.client.put(&message.url),
        };

        if let Some(username) = message.username.as_deref().filter(|u| !u.is_empty()) {
            request = request.basic_auth(username, message.password.as_deref());
        }

        request.json(&message.body)
    }

    /// Parse the Retry-After duration from a 429 response.
    fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
        for header in ["Retry-After", "X-RateLimit-Reset-After"] {
            if let Some(value) = response.headers().get(header)
                && let Ok(secs) = value.to_str().ok()?.parse::<f64>()
                && secs.is_finite()
                && secs >= 0.0
            {
                return Some(Duration::from_secs_f64(secs));
            }
        }
        None
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send_webhook(&self, message: WebhookMessage) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .build_request(&message)
                .send()
                .await
                .map_err(|e| Error::Notification(format!("webhook request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                debug!(method = %message.method, status = status.as_u16(), "Webhook delivered");
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = Self::parse_retry_after(&response);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Webhook rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::Notification(format!(
                        "webhook rate limited after {} attempts",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Webhook rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            warn!("Webhook failed: {} - {}", status, body);
            return Err(Error::Notification(format!(
                "webhook returned {}: {}",
                status, body
            )));
        }
    }
}
