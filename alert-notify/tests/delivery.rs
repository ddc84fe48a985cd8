mod common;

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use alert_notify::config::NotifyConfig;
use alert_notify::notification::{AlertEvent, AlertState, CreateAlertNotificationCommand};
use alert_notify::services::ServiceContainer;

#[tokio::test]
async fn googlechat_card_is_posted_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/spaces/ops/messages"))
        .and(body_partial_json(json!({ "previewText": "[Alerting] Disk full" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let pool = common::test_pool(&dir).await;
    let config = NotifyConfig::from_lookup(|key| match key {
        "ALERT_NOTIFY_SECRET_KEY" => Some("delivery-secret".to_string()),
        "ALERT_NOTIFY_HTTP_TIMEOUT_SECS" => Some("5".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.http_timeout, Duration::from_secs(5));

    let container = ServiceContainer::new(pool, &config).unwrap();
    let service = &container.notification_service;
    let token = container.cancellation_token();

    let mut cmd = CreateAlertNotificationCommand::new(1, "ops", "googlechat");
    cmd.uid = "ops".to_string();
    cmd.settings = json!({ "url": format!("{}/v1/spaces/ops/messages", server.uri()) });
    service.create_config(cmd, &token).await.unwrap();

    let notifiers = service
        .notifiers_to_send(1, &["ops".to_string()], &token)
        .await
        .unwrap();
    let event = AlertEvent::new(1, 3, "Disk full", AlertState::Ok, AlertState::Alerting)
        .with_message("/var at 99%");
    notifiers[0].send(&event).await.unwrap();

    container.shutdown().await;
    assert!(container.is_shutting_down());
}
