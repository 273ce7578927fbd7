use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::config::DiscordConfig;
use crate::plugins::traits::{EventKind, NotificationEvent, NotificationResult, NotifierPlugin};
use crate::price_parser::format_price;
use crate::{AppError, Result};

const MAX_DESCRIPTION: usize = 4096;
const MAX_FIELDS: usize = 25;

pub struct DiscordNotifier {
    client: Client,
    config: RwLock<Option<DiscordConfig>>,
}

impl Default for DiscordNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscordNotifier {
    pub fn new() -> Self {
        DiscordNotifier {
            client: Client::new(),
            config: RwLock::new(None),
        }
    }

    fn parse_config(config: &serde_json::Value) -> Result<DiscordConfig> {
        let discord: DiscordConfig = serde_json::from_value(config.clone())?;
        Url::parse(&discord.webhook_url)
            .map_err(|e| AppError::plugin("discord", format!("Invalid webhook URL: {}", e)))?;
        Ok(discord)
    }

    fn embed_color(event: &NotificationEvent) -> u32 {
        match event.kind {
            EventKind::PriceAlert if event.all_decreases() => 0x00ff00,
            EventKind::PriceAlert => 0xff9900,
            _ => 0x0099ff,
        }
    }

    fn emoji(event: &NotificationEvent) -> &'static str {
        match event.kind {
            EventKind::PriceAlert if event.all_decreases() => "📉",
            EventKind::PriceAlert => "📈",
            EventKind::Digest => "📰",
            EventKind::Message => "📊",
        }
    }

    pub fn create_embed(event: &NotificationEvent) -> serde_json::Value {
        let mut embed = json!({
            "title": format!("{} {}", Self::emoji(event), event.title),
            "color": Self::embed_color(event),
            "timestamp": event.timestamp.to_rfc3339(),
            "footer": { "text": "Lookout" },
        });

        if let Some(url) = &event.url {
            embed["url"] = json!(url);
        }

        if event.alerts.is_empty() {
            embed["description"] = json!(event.summary.chars().take(MAX_DESCRIPTION).collect::<String>());
            return embed;
        }

        let fields: Vec<serde_json::Value> = event
            .alerts
            .iter()
            .take(MAX_FIELDS)
            .map(|alert| {
                json!({
                    "name": alert.product,
                    "value": format!(
                        "**Old:** {}\n**New:** {}\n**Change:** {:+.1}%\n[View]({})",
                        format_price(alert.old_price, &alert.currency),
                        format_price(alert.new_price, &alert.currency),
                        alert.change_percent,
                        alert.url,
                    ),
                    "inline": false,
                })
            })
            .collect();
        embed["fields"] = json!(fields);
        embed
    }

    pub fn create_webhook_payload(event: &NotificationEvent, config: &DiscordConfig) -> serde_json::Value {
        let mut payload = json!({
            "embeds": [Self::create_embed(event)]
        });

        if let Some(username) = &config.username {
            payload["username"] = json!(username);
        }

        if let Some(avatar_url) = &config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    fn description(&self) -> &str {
        "Sends rich notifications via Discord webhooks with embeds"
    }

    async fn initialize(&self, config: &serde_json::Value) -> Result<()> {
        let discord = Self::parse_config(config)?;
        *self.config.write().await = Some(discord);
        Ok(())
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        let config = self
            .config
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::plugin("discord", "notifier not initialized"))?;

        let payload = Self::create_webhook_payload(event, &config);
        let response = self.client.post(&config.webhook_url).json(&payload).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, "Discord webhook accepted");
            Ok(NotificationResult::sent(None))
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(NotificationResult::failed(format!("Discord API error {}: {}", status, body)))
        }
    }

    async fn test_connection(&self) -> Result<bool> {
        let Some(config) = self.config.read().await.clone() else {
            return Ok(false);
        };
        // GET on a webhook URL returns its metadata without posting.
        let response = self.client.get(&config.webhook_url).send().await?;
        Ok(response.status().is_success())
    }

    fn validate_config(&self, config: &serde_json::Value) -> bool {
        Self::parse_config(config).is_ok()
    }

    async fn shutdown(&self) -> Result<()> {
        self.config.write().await.take();
        Ok(())
    }
}
