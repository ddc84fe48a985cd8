mod common;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use alert_notify::Error;
use alert_notify::notification::{
    AlertEvent, AlertState, CreateAlertNotificationCommand, DeleteAlertNotificationCommand,
    DeleteAlertNotificationWithUidCommand, GoogleChatNotifier, RekeyUidCommand,
    UpdateAlertNotificationCommand, UpdateAlertNotificationWithUidCommand, WebhookNotifier,
};

use common::spawn_app;

fn secrets(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn googlechat(name: &str, url: &str) -> CreateAlertNotificationCommand {
    let mut cmd = CreateAlertNotificationCommand::new(1, name, "googlechat");
    cmd.settings = json!({ "url": url });
    cmd
}

#[tokio::test]
async fn googlechat_channel_round_trip() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let mut cmd = googlechat("ops", "http://example.com");
    cmd.uid = "ops-chat".to_string();
    cmd.send_reminder = true;
    cmd.frequency = Duration::from_secs(300);
    let created = service.create_config(cmd, &token).await.unwrap();

    assert!(created.id > 0);
    assert_eq!(created.version, 0);
    assert_eq!(created.notifier_type, "googlechat");

    let loaded = service.get_config_by_uid(1, "ops-chat", &token).await.unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.setting_str("url"), Some("http://example.com"));
    assert_eq!(loaded.frequency, Duration::from_secs(300));
    assert!(loaded.send_reminder);

    let by_name = service.get_config_by_name(1, "ops", &token).await.unwrap();
    assert_eq!(by_name.uid, "ops-chat");

    let notifiers = service
        .notifiers_to_send(1, &["ops-chat".to_string()], &token)
        .await
        .unwrap();
    assert_eq!(notifiers.len(), 1);
    let chat = notifiers[0]
        .as_any()
        .downcast_ref::<GoogleChatNotifier>()
        .unwrap();
    assert_eq!(chat.url, "http://example.com");

    let event = AlertEvent::new(1, 5, "CPU high", AlertState::Ok, AlertState::Alerting);
    notifiers[0].send(&event).await.unwrap();
    assert_eq!(app.sender.messages.lock()[0].url, "http://example.com");
}

#[tokio::test]
async fn generated_uid_when_empty() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let created = service
        .create_config(googlechat("ops", "http://example.com"), &token)
        .await
        .unwrap();
    assert_eq!(created.uid.len(), 9);
    assert!(created.uid.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[tokio::test]
async fn invalid_configs_are_never_stored() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let mut missing_url = CreateAlertNotificationCommand::new(1, "no-url", "googlechat");
    missing_url.settings = json!({});
    let err = service.create_config(missing_url, &token).await.unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("url"));

    let mut unknown = CreateAlertNotificationCommand::new(1, "unknown", "unknown-channel");
    unknown.settings = json!({ "url": "http://example.com" });
    let err = service.create_config(unknown, &token).await.unwrap_err();
    assert!(matches!(err, Error::UnknownNotifierType(_)));

    let mut long_uid = googlechat("long", "http://example.com");
    long_uid.uid = "x".repeat(41);
    assert!(service.create_config(long_uid, &token).await.unwrap_err().is_validation());

    assert!(service.list_configs(1, &token).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_uid_or_name_rejected() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let mut first = googlechat("ops", "http://example.com");
    first.uid = "same".to_string();
    service.create_config(first, &token).await.unwrap();

    let mut same_uid = googlechat("other", "http://example.com");
    same_uid.uid = "same".to_string();
    let err = service.create_config(same_uid, &token).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));

    let err = service
        .create_config(googlechat("ops", "http://example.com"), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));

    // Uniqueness is per organisation.
    let mut other_org = googlechat("ops", "http://example.com");
    other_org.org_id = 2;
    other_org.uid = "same".to_string();
    service.create_config(other_org, &token).await.unwrap();
}

#[tokio::test]
async fn update_merges_secure_settings() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let mut cmd = CreateAlertNotificationCommand::new(1, "hook", "webhook");
    cmd.settings = json!({ "url": "http://hooks.local", "username": "u" });
    cmd.secure_settings = secrets(&[("a", "1"), ("password", "2")]);
    let created = service.create_config(cmd, &token).await.unwrap();

    let mut update = UpdateAlertNotificationCommand::new(created.id, 1, "hook", "webhook");
    update.settings = json!({ "url": "http://hooks.local", "username": "u" });
    update.secure_settings = secrets(&[("password", "3"), ("c", "4")]);
    let updated = service.update_config(update, &token).await.unwrap();
    assert_eq!(updated.version, 1);
    assert_eq!(updated.uid, created.uid);

    let stored = service.get_config(1, created.id, &token).await.unwrap();
    for (field, expected) in [("a", "1"), ("password", "3"), ("c", "4")] {
        assert_eq!(
            service.decrypted_value(&stored, field, "", &token).await.unwrap(),
            expected,
            "field {}",
            field
        );
    }

    let notifiers = service
        .notifiers_to_send(1, &[created.uid.clone()], &token)
        .await
        .unwrap();
    let hook = notifiers[0].as_any().downcast_ref::<WebhookNotifier>().unwrap();
    assert_eq!(hook.username.as_deref(), Some("u"));
}

#[tokio::test]
async fn update_by_uid_and_missing_targets() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let mut cmd = googlechat("ops", "http://example.com");
    cmd.uid = "ops-chat".to_string();
    service.create_config(cmd, &token).await.unwrap();

    let updated = service
        .update_config_by_uid(
            UpdateAlertNotificationWithUidCommand {
                uid: "ops-chat".to_string(),
                org_id: 1,
                name: "ops renamed".to_string(),
                notifier_type: "googlechat".to_string(),
                is_default: true,
                send_reminder: false,
                frequency: Duration::ZERO,
                disable_resolve_message: true,
                settings: json!({ "url": "https://chat.googleapis.com/v1/spaces/x" }),
                secure_settings: HashMap::new(),
            },
            &token,
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "ops renamed");
    assert!(updated.is_default);
    assert!(updated.disable_resolve_message);

    let mut missing = UpdateAlertNotificationCommand::new(999, 1, "ghost", "googlechat");
    missing.settings = json!({ "url": "http://example.com" });
    let err = service.update_config(missing, &token).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("unable to find the alert notification"));
}

#[tokio::test]
async fn stale_config_version_is_rejected() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let created = service
        .create_config(googlechat("ops", "http://example.com"), &token)
        .await
        .unwrap();

    // Another writer lands between this caller's read and write.
    sqlx::query("UPDATE alert_notification SET version = version + 1 WHERE id = ?")
        .bind(created.id)
        .execute(&app.container.pool)
        .await
        .unwrap();

    let store = alert_notify::database::repositories::SqlxAlertNotificationStore::new(
        app.container.pool.clone(),
    );
    let err = alert_notify::database::repositories::AlertNotificationStore::update_config(
        &store,
        &alert_notify::notification::models::AlertNotificationUpdate {
            id: created.id,
            org_id: 1,
            expected_version: created.version,
            name: "ops".to_string(),
            notifier_type: "googlechat".to_string(),
            settings: json!({ "url": "http://example.com" }),
            secure_settings: Vec::new(),
            is_default: false,
            send_reminder: false,
            frequency: Duration::ZERO,
            disable_resolve_message: false,
        },
    )
    .await
    .unwrap_err();
    assert!(err.is_version_conflict());
}

#[tokio::test]
async fn rekey_and_delete() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let mut cmd = googlechat("ops", "http://example.com");
    cmd.uid = "old".to_string();
    let created = service.create_config(cmd, &token).await.unwrap();

    let rekeyed = service
        .rekey_uid(
            RekeyUidCommand {
                org_id: 1,
                uid: "old".to_string(),
                new_uid: "new".to_string(),
            },
            &token,
        )
        .await
        .unwrap();
    assert_eq!(rekeyed.id, created.id);
    assert!(service.get_config_by_uid(1, "old", &token).await.unwrap_err().is_not_found());

    let deleted = service
        .delete_config_by_uid(
            DeleteAlertNotificationWithUidCommand {
                org_id: 1,
                uid: "new".to_string(),
            },
            &token,
        )
        .await
        .unwrap();
    assert_eq!(deleted, created.id);

    let err = service
        .delete_config(DeleteAlertNotificationCommand { org_id: 1, id: created.id }, &token)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn send_set_includes_default_channels() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();

    let mut listed = googlechat("listed", "http://listed.example.com");
    listed.uid = "listed".to_string();
    service.create_config(listed, &token).await.unwrap();

    let mut default = googlechat("default", "http://default.example.com");
    default.uid = "default".to_string();
    default.is_default = true;
    service.create_config(default, &token).await.unwrap();

    let mut other = googlechat("other", "http://other.example.com");
    other.uid = "other".to_string();
    service.create_config(other, &token).await.unwrap();

    let configs = service
        .configs_to_send(1, &["listed".to_string()], &token)
        .await
        .unwrap();
    let mut uids: Vec<_> = configs.iter().map(|c| c.uid.as_str()).collect();
    uids.sort();
    assert_eq!(uids, vec!["default", "listed"]);

    let configs = service.configs_to_send(1, &[], &token).await.unwrap();
    assert_eq!(configs.len(), 1);
}

#[tokio::test]
async fn cancelled_token_aborts_before_write() {
    let app = spawn_app().await;
    let service = &app.container.notification_service;
    let token = CancellationToken::new();
    token.cancel();

    let err = service
        .create_config(googlechat("ops", "http://example.com"), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let live = CancellationToken::new();
    assert!(service.list_configs(1, &live).await.unwrap().is_empty());
}
