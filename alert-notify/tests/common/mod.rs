#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use alert_notify::Result;
use alert_notify::database::{DbPool, init_pool_with_size, run_migrations};
use alert_notify::encryption::SecretKey;
use alert_notify::notification::{NotificationSender, NotifierRegistry, WebhookMessage};
use alert_notify::services::ServiceContainer;

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

pub struct TestApp {
    pub container: ServiceContainer,
    pub sender: Arc<RecordingSender>,
    // Dropped last; owns the database file.
    _dir: TempDir,
}

pub async fn test_pool(dir: &TempDir) -> DbPool {
    let db_path = dir.path().join("alert-notify.db");
    let db_url = format!(
        "sqlite:{}?mode=rwc",
        db_path.to_string_lossy().replace('\\', "/")
    );
    let pool = init_pool_with_size(&db_url, 8).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

pub async fn spawn_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir).await;
    let sender = Arc::new(RecordingSender::default());
    let container = ServiceContainer::with_parts(
        pool,
        SecretKey::new("integration-test-secret").unwrap(),
        Arc::new(NotifierRegistry::with_builtin_notifiers()),
        sender.clone(),
    );

    TestApp {
        container,
        sender,
        _dir: dir,
    }
}
