//! Service container for dependency injection.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;
use crate::config::NotifyConfig;
use crate::database::repositories::{AlertNotificationStore, SqlxAlertNotificationStore};
use crate::encryption::{AesGcmEncryption, SecretKey, SecureSettingsCodec};
use crate::notification::{
    AlertNotificationService, HttpNotificationSender, NotificationSender, NotifierRegistry,
};

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    /// Notifier constructors, shared with the service.
    pub registry: Arc<NotifierRegistry>,
    /// Channel configuration and delivery state.
    pub notification_service: Arc<AlertNotificationService>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build the default service graph from process configuration.
    pub fn new(pool: SqlitePool, config: &NotifyConfig) -> Result<Self> {
        let sender = Arc::new(HttpNotificationSender::new(config.http_timeout)?);
        Ok(Self::with_parts(
            pool,
            config.secret_key.clone(),
            Arc::new(NotifierRegistry::with_builtin_notifiers()),
            sender,
        ))
    }

    /// Build with a caller-provided registry and sender.
    pub fn with_parts(
        pool: SqlitePool,
        secret_key: SecretKey,
        registry: Arc<NotifierRegistry>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        info!("Initializing service container");

        let store: Arc<dyn AlertNotificationStore> =
            Arc::new(SqlxAlertNotificationStore::new(pool.clone()));
        let codec = SecureSettingsCodec::new(Arc::new(AesGcmEncryption::new()), secret_key);
        let notification_service = Arc::new(AlertNotificationService::new(
            store,
            codec,
            registry.clone(),
            sender,
        ));

        info!("Service container initialized");

        Self {
            pool,
            registry,
            notification_service,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Get a clone of the shutdown token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Cancel in-flight operations and close the pool.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        self.pool.close().await;
        info!("Services shut down");
    }
}
