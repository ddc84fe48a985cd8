//! Alert notification module.
//!
//! Configuration of notification channels (Google Chat, Discord, generic
//! webhooks) and the per-alert delivery state that keeps concurrent
//! evaluators from sending the same notification twice.
//!
//! # Example
//!
//! ```ignore
//! use alert_notify::notification::{AlertNotificationService, CreateAlertNotificationCommand};
//!
//! let mut cmd = CreateAlertNotificationCommand::new(1, "ops", "googlechat");
//! cmd.settings = serde_json::json!({ "url": "https://chat.googleapis.com/v1/spaces/..." });
//! let channel = service.create_config(cmd, &token).await?;
//! ```

pub mod channels;
pub mod events;
pub mod models;
pub mod registry;
pub mod sender;
pub mod service;
pub mod state;

pub use channels::{DiscordNotifier, GoogleChatNotifier, Notifier, NotifierBase, WebhookNotifier};
pub use events::{AlertEvent, AlertState, EvalMatch};
pub use models::{
    AlertNotification, CreateAlertNotificationCommand, DeleteAlertNotificationCommand,
    DeleteAlertNotificationWithUidCommand, MAX_UID_LENGTH, RekeyUidCommand,
    UpdateAlertNotificationCommand, UpdateAlertNotificationWithUidCommand,
};
pub use registry::{NotifierFactory, NotifierOption, NotifierPlugin, NotifierRegistry};
pub use sender::{HttpMethod, HttpNotificationSender, NotificationSender, WebhookMessage};
pub use service::AlertNotificationService;
pub use state::{
    AlertNotificationState, NotificationStateKey, NotificationStateKind,
    NotificationStateTracker, SetStateCompletedCommand, SetStatePendingCommand,
};
