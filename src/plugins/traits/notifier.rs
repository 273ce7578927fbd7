use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PriceAlert;
use crate::monitor::format_alert_message;
use crate::price_parser::format_price;
use crate::utils::html::escape;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PriceAlert,
    Digest,
    Message,
}

/// Something worth telling the user about, rendered per channel by each notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub title: String,
    /// Plain text body with `**bold**` markers.
    pub summary: String,
    pub html: Option<String>,
    pub url: Option<String>,
    pub alerts: Vec<PriceAlert>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn from_alerts(alerts: &[PriceAlert]) -> Self {
        let title = match alerts {
            [single] => format!("Price alert: {}", single.product),
            _ => format!("{} price alerts", alerts.len()),
        };

        Self {
            kind: EventKind::PriceAlert,
            title,
            summary: format_alert_message(alerts),
            html: Some(alerts_html(alerts)),
            url: match alerts {
                [single] => Some(single.url.clone()),
                _ => None,
            },
            alerts: alerts.to_vec(),
            timestamp: Utc::now(),
        }
    }

    pub fn digest(title: impl Into<String>, body: impl Into<String>, html: Option<String>) -> Self {
        Self {
            kind: EventKind::Digest,
            title: title.into(),
            summary: body.into(),
            html,
            url: None,
            alerts: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn message(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Message,
            ..Self::digest(title, body, None)
        }
    }

    /// True when every alert in the event is a price decrease.
    pub fn all_decreases(&self) -> bool {
        !self.alerts.is_empty() && self.alerts.iter().all(PriceAlert::is_decrease)
    }
}

fn alerts_html(alerts: &[PriceAlert]) -> String {
    let rows: String = alerts
        .iter()
        .map(|a| {
            format!(
                "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{:+.1}%</td><td>{}</td></tr>",
                escape(&a.url),
                escape(&a.product),
                format_price(a.old_price, &a.currency),
                format_price(a.new_price, &a.currency),
                a.change_percent,
                a.alert_type,
            )
        })
        .collect();

    format!(
        "<h2>Price Alerts</h2><table><tr><th>Product</th><th>Was</th><th>Now</th><th>Change</th><th>Type</th></tr>{}</table>",
        rows
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;
    fn description(&self) -> &str;

    /// Stores the channel configuration; must be called before `notify`.
    async fn initialize(&self, config: &serde_json::Value) -> Result<()>;

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult>;

    async fn test_connection(&self) -> Result<bool>;

    fn validate_config(&self, config: &serde_json::Value) -> bool;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
