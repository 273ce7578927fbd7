use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::SmtpConfig;
use crate::mailer::{OutgoingEmail, Outbox, SmtpOutbox};
use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};
use crate::{AppError, Result};

struct EmailChannel {
    outbox: Arc<dyn Outbox>,
    smtp: Option<Arc<SmtpOutbox>>,
    to: String,
}

/// Sends notifications as multipart mail to `smtp.to_address`.
#[derive(Default)]
pub struct EmailNotifier {
    channel: RwLock<Option<EmailChannel>>,
}

impl EmailNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that delivers through `outbox` instead of SMTP.
    pub fn with_outbox(outbox: Arc<dyn Outbox>, to: impl Into<String>) -> Self {
        Self {
            channel: RwLock::new(Some(EmailChannel {
                outbox,
                smtp: None,
                to: to.into(),
            })),
        }
    }

    fn parse_config(config: &serde_json::Value) -> Result<(SmtpConfig, String)> {
        let smtp: SmtpConfig = serde_json::from_value(config.clone())?;
        let to = smtp
            .to_address
            .clone()
            .ok_or_else(|| AppError::plugin("email", "smtp.to_address is required for notifications"))?;
        Ok((smtp, to))
    }

    fn render(event: &NotificationEvent, to: &str) -> OutgoingEmail {
        let body_html = event
            .html
            .clone()
            .unwrap_or_else(|| format!("<pre>{}</pre>", event.summary));
        OutgoingEmail {
            to: to.to_string(),
            subject: event.title.clone(),
            body_html,
            body_text: Some(event.summary.replace("**", "")),
            reply_to: None,
        }
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn name(&self) -> &str {
        "Email Notifier"
    }

    fn plugin_type(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Sends notifications via SMTP email"
    }

    async fn initialize(&self, config: &serde_json::Value) -> Result<()> {
        let (smtp, to) = Self::parse_config(config)?;
        let outbox = Arc::new(SmtpOutbox::new(&smtp)?);
        *self.channel.write().await = Some(EmailChannel {
            outbox: outbox.clone(),
            smtp: Some(outbox),
            to,
        });
        info!(host = %smtp.host, "Email notifier initialized");
        Ok(())
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        let guard = self.channel.read().await;
        let channel = guard
            .as_ref()
            .ok_or_else(|| AppError::plugin("email", "notifier not initialized"))?;

        match channel.outbox.deliver(Self::render(event, &channel.to)).await {
            Ok(message_id) => Ok(NotificationResult::sent(Some(message_id))),
            Err(e) => Ok(NotificationResult::failed(e.to_string())),
        }
    }

    async fn test_connection(&self) -> Result<bool> {
        let guard = self.channel.read().await;
        match guard.as_ref() {
            Some(EmailChannel { smtp: Some(smtp), .. }) => smtp.test_connection().await,
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    fn validate_config(&self, config: &serde_json::Value) -> bool {
        Self::parse_config(config).is_ok()
    }

    async fn shutdown(&self) -> Result<()> {
        self.channel.write().await.take();
        Ok(())
    }
}
