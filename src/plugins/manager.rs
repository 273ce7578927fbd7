use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::notifiers::{DiscordNotifier, EmailNotifier, TelegramNotifier};
use super::traits::{NotificationEvent, NotificationResult, NotifierPlugin};
use crate::config::NotificationsConfig;
use crate::{AppError, Result};

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

#[derive(Clone, Default)]
pub struct PluginManager {
    notifiers: Arc<RwLock<HashMap<String, NotifierPluginBox>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a notifier for every channel configured in `config`.
    pub async fn from_config(config: &NotificationsConfig) -> Result<Self> {
        let manager = Self::new();

        if let Some(smtp) = &config.smtp {
            manager
                .register_notifier(Box::new(EmailNotifier::new()), &serde_json::to_value(smtp)?)
                .await?;
        }
        if let Some(discord) = &config.discord {
            manager
                .register_notifier(Box::new(DiscordNotifier::new()), &serde_json::to_value(discord)?)
                .await?;
        }
        if let Some(telegram) = &config.telegram {
            manager
                .register_notifier(Box::new(TelegramNotifier::new()), &serde_json::to_value(telegram)?)
                .await?;
        }

        Ok(manager)
    }

    /// Initializes `plugin` with `config` and registers it under its type.
    pub async fn register_notifier(&self, plugin: NotifierPluginBox, config: &serde_json::Value) -> Result<()> {
        let plugin_type = plugin.plugin_type().to_string();
        plugin.initialize(config).await.map_err(|e| {
            AppError::plugin(plugin_type.clone(), format!("Failed to initialize: {}", e))
        })?;

        info!(plugin = %plugin_type, "Registered notifier");
        self.notifiers.write().await.insert(plugin_type, plugin);
        Ok(())
    }

    pub async fn has_notifier(&self, plugin_type: &str) -> bool {
        self.notifiers.read().await.contains_key(plugin_type)
    }

    /// Registered notifier types, sorted.
    pub async fn list_notifier_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.notifiers.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn send_notification(&self, plugin_type: &str, event: &NotificationEvent) -> Result<NotificationResult> {
        let notifiers = self.notifiers.read().await;
        let notifier = notifiers
            .get(plugin_type)
            .ok_or_else(|| AppError::plugin(plugin_type, "Notifier plugin not found"))?;

        notifier
            .notify(event)
            .await
            .map_err(|e| AppError::plugin(plugin_type, format!("Notifier failed: {}", e)))
    }

    /// Sends `event` through every notifier. Failures are logged and reported, never raised.
    pub async fn broadcast(&self, event: &NotificationEvent) -> Vec<(String, NotificationResult)> {
        let notifiers = self.notifiers.read().await;
        let mut results = Vec::with_capacity(notifiers.len());

        for (plugin_type, notifier) in notifiers.iter() {
            let result = match notifier.notify(event).await {
                Ok(result) => result,
                Err(e) => NotificationResult::failed(e.to_string()),
            };

            if result.success {
                metrics::counter!("lookout_notifications_total", "channel" => plugin_type.clone(), "status" => "sent")
                    .increment(1);
            } else {
                metrics::counter!("lookout_notifications_total", "channel" => plugin_type.clone(), "status" => "failed")
                    .increment(1);
                warn!(
                    plugin = %plugin_type,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Notification failed"
                );
            }
            results.push((plugin_type.clone(), result));
        }

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Checks connectivity of every notifier, sorted by type.
    pub async fn test_all(&self) -> Vec<(String, Result<bool>)> {
        let notifiers = self.notifiers.read().await;
        let mut results = Vec::with_capacity(notifiers.len());
        for (plugin_type, notifier) in notifiers.iter() {
            results.push((plugin_type.clone(), notifier.test_connection().await));
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut notifiers = self.notifiers.write().await;
        for (plugin_type, plugin) in notifiers.drain() {
            if let Err(e) = plugin.shutdown().await {
                warn!(plugin = %plugin_type, error = %e, "Error shutting down notifier plugin");
            }
        }
        Ok(())
    }
}
