//! Notifier registry.
//!
//! Maps a channel type tag (e.g. `"googlechat"`) to the constructor that turns
//! a stored config into a [`Notifier`]. Constructing is validating: a config
//! is accepted only if its constructor succeeds.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::channels::{Notifier, discord_plugin, googlechat_plugin, webhook_plugin};
use super::models::AlertNotification;
use super::sender::NotificationSender;
use crate::encryption::SecretsAccessor;
use crate::{Error, Result};

/// Constructor for one notifier type.
pub type NotifierFactory = Arc<
    dyn Fn(
            &AlertNotification,
            &dyn SecretsAccessor,
            Arc<dyn NotificationSender>,
        ) -> Result<Box<dyn Notifier>>
        + Send
        + Sync,
>;

/// One configurable field of a notifier type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierOption {
    pub element: &'static str,
    pub input_type: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub property_name: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub select_options: Vec<&'static str>,
    pub required: bool,
    pub secure: bool,
}

impl NotifierOption {
    fn input(
        input_type: &'static str,
        property_name: &'static str,
        label: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            element: "input",
            input_type,
            label,
            description,
            property_name,
            select_options: Vec::new(),
            required: false,
            secure: false,
        }
    }

    pub fn text(property_name: &'static str, label: &'static str, description: &'static str) -> Self {
        Self::input("text", property_name, label, description)
    }

    /// Stored in secure settings.
    pub fn password(property_name: &'static str, label: &'static str, description: &'static str) -> Self {
        Self {
            secure: true,
            ..Self::input("password", property_name, label, description)
        }
    }

    pub fn checkbox(property_name: &'static str, label: &'static str, description: &'static str) -> Self {
        Self {
            element: "checkbox",
            ..Self::input("", property_name, label, description)
        }
    }

    pub fn select(
        property_name: &'static str,
        label: &'static str,
        description: &'static str,
        options: &[&'static str],
    ) -> Self {
        Self {
            element: "select",
            select_options: options.to_vec(),
            ..Self::input("", property_name, label, description)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Registration entry: descriptor plus constructor.
#[derive(Clone, Serialize)]
pub struct NotifierPlugin {
    #[serde(rename = "type")]
    pub notifier_type: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub heading: &'static str,
    pub options: Vec<NotifierOption>,
    #[serde(skip)]
    factory: NotifierFactory,
}

impl NotifierPlugin {
    pub fn new<F>(
        notifier_type: &'static str,
        name: &'static str,
        description: &'static str,
        heading: &'static str,
        options: Vec<NotifierOption>,
        factory: F,
    ) -> Self
    where
        F: Fn(
                &AlertNotification,
                &dyn SecretsAccessor,
                Arc<dyn NotificationSender>,
            ) -> Result<Box<dyn Notifier>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            notifier_type,
            name,
            description,
            heading,
            options,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for NotifierPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierPlugin")
            .field("notifier_type", &self.notifier_type)
            .field("name", &self.name)
            .field("options", &self.options.len())
            .finish_non_exhaustive()
    }
}

/// Process-wide table of notifier constructors.
///
/// Read-mostly: lookups take a shared lock and release it before the
/// constructor runs.
#[derive(Default)]
pub struct NotifierRegistry {
    plugins: RwLock<HashMap<String, NotifierPlugin>>,
}

impl NotifierRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in notifiers.
    pub fn with_builtin_notifiers() -> Self {
        let registry = Self::new();
        registry.register(googlechat_plugin());
        registry.register(webhook_plugin());
        registry.register(discord_plugin());
        registry
    }

    /// Register a notifier type, replacing any previous registration of the same tag.
    pub fn register(&self, plugin: NotifierPlugin) {
        let tag = plugin.notifier_type.to_string();
        if self.plugins.write().insert(tag.clone(), plugin).is_some() {
            warn!(notifier_type = %tag, "Notifier type registered twice; previous registration replaced");
        } else {
            debug!(notifier_type = %tag, "Registered notifier type");
        }
    }

    /// Construct (and thereby validate) a notifier for `config`.
    pub fn build(
        &self,
        config: &AlertNotification,
        secrets: &dyn SecretsAccessor,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<Box<dyn Notifier>> {
        let factory = self
            .plugins
            .read()
            .get(&config.notifier_type)
            .map(|p| p.factory.clone())
            .ok_or_else(|| Error::UnknownNotifierType(config.notifier_type.clone()))?;

        factory(config, secrets, sender)
    }

    pub fn contains(&self, notifier_type: &str) -> bool {
        self.plugins.read().contains_key(notifier_type)
    }

    /// Descriptors of all registered types, sorted by tag.
    pub fn plugins(&self) -> Vec<NotifierPlugin> {
        let mut plugins: Vec<_> = self.plugins.read().values().cloned().collect();
        plugins.sort_by_key(|p| p.notifier_type);
        plugins
    }
}

impl fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.plugins.read().keys().cloned().collect();
        types.sort();
        f.debug_struct("NotifierRegistry")
            .field("types", &types)
            .finish()
    }
}
