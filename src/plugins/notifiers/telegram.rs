use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use url::Url;

use crate::config::TelegramConfig;
use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};
use crate::utils::html::escape;
use crate::{AppError, Result};

const MAX_MESSAGE: usize = 4096;

fn bold_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold regex is valid"))
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

pub struct TelegramNotifier {
    client: Client,
    config: RwLock<Option<TelegramConfig>>,
}

impl Default for TelegramNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramNotifier {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            config: RwLock::new(None),
        }
    }

    fn parse_config(config: &serde_json::Value) -> Result<TelegramConfig> {
        let telegram: TelegramConfig = serde_json::from_value(config.clone())?;
        if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
            return Err(AppError::plugin("telegram", "bot_token and chat_id are required"));
        }
        Url::parse(&telegram.api_base)
            .map_err(|e| AppError::plugin("telegram", format!("Invalid API base: {}", e)))?;
        Ok(telegram)
    }

    fn method_url(config: &TelegramConfig, method: &str) -> String {
        format!("{}/bot{}/{}", config.api_base.trim_end_matches('/'), config.bot_token, method)
    }

    /// Message body for `parse_mode: HTML`. Event text is escaped, then
    /// `**bold**` spans become `<b>` tags.
    pub fn format_text(event: &NotificationEvent) -> String {
        let mut raw = event.summary.clone();
        if let (Some(url), true) = (&event.url, event.alerts.is_empty()) {
            raw.push_str(&format!("\n\n{}", url));
        }
        let budget = MAX_MESSAGE.saturating_sub(event.title.chars().count() + 2);
        let body: String = raw.chars().take(budget).collect();

        format!(
            "<b>{}</b>\n\n{}",
            escape(&event.title),
            bold_regex().replace_all(&escape(&body), "<b>$1</b>")
        )
    }

    async fn call(&self, url: &str, payload: Option<serde_json::Value>) -> Result<ApiResponse> {
        let request = match payload {
            Some(payload) => self.client.post(url).json(&payload),
            None => self.client.get(url),
        };
        Ok(request.send().await?.json::<ApiResponse>().await?)
    }
}

#[async_trait]
impl NotifierPlugin for TelegramNotifier {
    fn name(&self) -> &str {
        "Telegram Notifier"
    }

    fn plugin_type(&self) -> &str {
        "telegram"
    }

    fn description(&self) -> &str {
        "Sends HTML-formatted notifications through a Telegram bot"
    }

    async fn initialize(&self, config: &serde_json::Value) -> Result<()> {
        let telegram = Self::parse_config(config)?;
        *self.config.write().await = Some(telegram);
        Ok(())
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        let config = self
            .config
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::plugin("telegram", "notifier not initialized"))?;

        let payload = json!({
            "chat_id": config.chat_id,
            "text": Self::format_text(event),
            "parse_mode": "HTML",
            "disable_web_page_preview": config.disable_preview,
        });

        let response = self.call(&Self::method_url(&config, "sendMessage"), Some(payload)).await?;
        if !response.ok {
            return Ok(NotificationResult::failed(
                response.description.unwrap_or_else(|| "Telegram API error".to_string()),
            ));
        }

        let message_id = response
            .result
            .as_ref()
            .and_then(|r| r.get("message_id"))
            .map(|id| id.to_string());
        Ok(NotificationResult::sent(message_id))
    }

    async fn test_connection(&self) -> Result<bool> {
        let Some(config) = self.config.read().await.clone() else {
            return Ok(false);
        };
        Ok(self.call(&Self::method_url(&config, "getMe"), None).await?.ok)
    }

    fn validate_config(&self, config: &serde_json::Value) -> bool {
        Self::parse_config(config).is_ok()
    }

    async fn shutdown(&self) -> Result<()> {
        self.config.write().await.take();
        Ok(())
    }
}
