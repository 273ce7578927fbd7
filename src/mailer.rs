use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::templates::{Context, render};
use crate::utils::fs::write_json;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailTemplate {
    pub name: String,
    pub subject: String,
    pub body_html: String,
    #[serde(default)]
    pub body_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendResult {
    pub to: String,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage rounded to one decimal place.
    pub success_rate: f64,
}

/// Delivers a single message and returns its Message-ID.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn deliver(&self, email: OutgoingEmail) -> Result<String>;
}

pub struct SmtpOutbox {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpOutbox {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = Mailbox::new(Some(config.from_name.clone()), config.from_address.parse::<Address>()?);
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    pub async fn test_connection(&self) -> Result<bool> {
        Ok(self.transport.test_connection().await?)
    }
}

#[async_trait]
impl Outbox for SmtpOutbox {
    async fn deliver(&self, email: OutgoingEmail) -> Result<String> {
        let message_id = new_message_id(&self.from);
        let message = build_message(&self.from, &email, &message_id)?;
        self.transport.send(message).await?;
        Ok(message_id)
    }
}

fn new_message_id(from: &Mailbox) -> String {
    format!("<{}@{}>", Uuid::new_v4().simple(), from.email.domain())
}

/// A `multipart/alternative` message, or a single HTML part without a text body.
pub fn build_message(from: &Mailbox, email: &OutgoingEmail, message_id: &str) -> Result<Message> {
    let mut builder = Message::builder()
        .from(from.clone())
        .to(email.to.parse::<Mailbox>()?)
        .subject(email.subject.clone())
        .message_id(Some(message_id.to_string()));

    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(reply_to.parse::<Mailbox>()?);
    }

    let message = match &email.body_text {
        Some(text) => builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(text.clone()))
                .singlepart(SinglePart::html(email.body_html.clone())),
        )?,
        None => builder.singlepart(SinglePart::html(email.body_html.clone()))?,
    };
    Ok(message)
}

/// Sends templated mail to many recipients, recording every outcome.
pub struct BulkMailer {
    outbox: Arc<dyn Outbox>,
    rate_limit: Duration,
    results: Vec<SendResult>,
}

impl BulkMailer {
    pub fn new(outbox: Arc<dyn Outbox>, rate_limit: Duration) -> Self {
        Self {
            outbox,
            rate_limit,
            results: Vec::new(),
        }
    }

    pub fn results(&self) -> &[SendResult] {
        &self.results
    }

    pub async fn send_one(&mut self, email: OutgoingEmail) -> SendResult {
        let to = email.to.clone();
        let result = match self.outbox.deliver(email).await {
            Ok(message_id) => {
                metrics::counter!("lookout_emails_sent_total", "status" => "sent").increment(1);
                debug!(to = %to, message_id = %message_id, "Email sent");
                SendResult {
                    to,
                    success: true,
                    message_id: Some(message_id),
                    error: None,
                    sent_at: Some(Utc::now()),
                    dry_run: false,
                }
            }
            Err(e) => {
                metrics::counter!("lookout_emails_sent_total", "status" => "failed").increment(1);
                warn!(to = %to, error = %e, "Email failed");
                SendResult {
                    to,
                    success: false,
                    message_id: None,
                    error: Some(e.to_string()),
                    sent_at: None,
                    dry_run: false,
                }
            }
        };

        self.results.push(result.clone());
        result
    }

    pub async fn send_templated(
        &mut self,
        to: &str,
        template: &EmailTemplate,
        variables: &Context,
        reply_to: Option<&str>,
    ) -> SendResult {
        let email = OutgoingEmail {
            to: to.to_string(),
            subject: render(&template.subject, variables),
            body_html: render(&template.body_html, variables),
            body_text: template.body_text.as_deref().map(|t| render(t, variables)),
            reply_to: reply_to.map(str::to_string),
        };
        self.send_one(email).await
    }

    /// Each recipient map doubles as the template context.
    ///
    /// Rows without an address are skipped; `max_sends` caps the number of rows read.
    pub async fn send_from_list(
        &mut self,
        recipients: &[Context],
        template: &EmailTemplate,
        email_key: &str,
        max_sends: Option<usize>,
        dry_run: bool,
    ) -> Vec<SendResult> {
        let mut results = Vec::new();
        let mut delivered_any = false;

        for (i, recipient) in recipients.iter().enumerate() {
            if max_sends.is_some_and(|max| i >= max) {
                break;
            }

            let Some(to) = recipient.get(email_key).map(|e| e.trim()).filter(|e| !e.is_empty()) else {
                debug!(row = i + 1, "Skipping recipient without address");
                continue;
            };

            info!(row = i + 1, to, dry_run, "Sending email");
            let result = if dry_run {
                let result = SendResult {
                    to: to.to_string(),
                    success: true,
                    message_id: None,
                    error: None,
                    sent_at: None,
                    dry_run: true,
                };
                self.results.push(result.clone());
                result
            } else {
                if delivered_any && !self.rate_limit.is_zero() {
                    tokio::time::sleep(self.rate_limit).await;
                }
                delivered_any = true;
                self.send_templated(to, template, recipient, None).await
            };
            results.push(result);
        }

        results
    }

    pub async fn send_from_csv(
        &mut self,
        path: &Path,
        template: &EmailTemplate,
        email_column: &str,
        max_sends: Option<usize>,
        dry_run: bool,
    ) -> Result<Vec<SendResult>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut recipients = Vec::new();
        for row in reader.deserialize::<HashMap<String, String>>() {
            recipients.push(row?);
        }

        Ok(self
            .send_from_list(&recipients, template, email_column, max_sends, dry_run)
            .await)
    }

    pub fn stats(&self) -> SendStats {
        let total = self.results.len();
        let successful = self.results.iter().filter(|r| r.success).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            (successful as f64 / total as f64 * 1000.0).round() / 10.0
        };

        SendStats {
            total,
            successful,
            failed: total - successful,
            success_rate,
        }
    }

    pub fn export_results(&self, path: &Path) -> Result<()> {
        write_json(path, &self.results)
    }
}
