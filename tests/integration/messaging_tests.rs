use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lookout::config::NotificationsConfig;
use lookout::mailer::{BulkMailer, EmailTemplate, OutgoingEmail, Outbox};
use lookout::models::{BookingStage, Guest};
use lookout::plugins::{NotificationEvent, PluginManager};
use lookout::templates::GuestMessenger;
use lookout::utils::fs::load_document;

use super::write_file;

/// Records every delivered message; addresses at `bounce.example.com` fail.
#[derive(Default)]
struct RecordingOutbox {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Outbox for RecordingOutbox {
    async fn deliver(&self, email: OutgoingEmail) -> lookout::Result<String> {
        if email.to.ends_with("@bounce.example.com") {
            return Err(lookout::AppError::Validation("mailbox unavailable".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(email);
        Ok(format!("<{}@example.com>", sent.len()))
    }
}

#[test]
fn test_guest_schedule_from_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let properties = write_file(
        dir.path(),
        "properties.toml",
        r#"
[[properties]]
name = "Lake House"
address = "1 Shore Rd"
host_name = "Sam"
door_code = "9876"
wifi_name = "Lake"
wifi_password = "swim"
"#,
    );
    let guest_file = write_file(
        dir.path(),
        "guest.json",
        r#"{"name": "Ada Lovelace", "num_guests": 2, "check_in": "2026-07-10", "check_out": "2026-07-12"}"#,
    );

    let mut messenger = GuestMessenger::with_default_templates();
    assert_eq!(messenger.add_properties_from_file(&properties)?, 1);
    let guest: Guest = load_document(&guest_file)?;

    let now = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
    let scheduled = messenger.get_scheduled_messages(&guest, "Lake House", now)?;
    assert_eq!(scheduled.len(), 6);
    assert!(scheduled.windows(2).all(|w| w[0].send_at <= w[1].send_at));

    let pre_arrival = scheduled
        .iter()
        .find(|m| m.message.stage == BookingStage::PreArrival)
        .unwrap();
    assert!(pre_arrival.message.body.contains("9876"));
    assert!(pre_arrival.message.body.starts_with("Hi Ada"));
    Ok(())
}

#[tokio::test]
async fn test_bulk_mail_from_csv() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let csv = write_file(
        dir.path(),
        "contacts.csv",
        "email,name,company\nann@example.com,Ann,Acme\n,NoAddress,Nowhere\nbob@bounce.example.com,Bob,Bounce\ncy@example.com,Cy,Cyber\n",
    );
    let template = EmailTemplate {
        name: "intro".to_string(),
        subject: "Hello {name}".to_string(),
        body_html: "<p>Hi {name} from {company}</p>".to_string(),
        body_text: Some("Hi {name} from {company}".to_string()),
    };

    let outbox = Arc::new(RecordingOutbox::default());
    let mut mailer = BulkMailer::new(outbox.clone(), Duration::ZERO);
    let results = mailer.send_from_csv(&csv, &template, "email", None, false).await?;

    assert_eq!(results.len(), 3);
    let stats = mailer.stats();
    assert_eq!((stats.total, stats.successful, stats.failed), (3, 2, 1));
    assert_eq!(stats.success_rate, 66.7);

    let sent = outbox.sent.lock().unwrap();
    assert_eq!(sent[0].subject, "Hello Ann");
    assert_eq!(sent[1].body_text.as_deref(), Some("Hi Cy from Cyber"));

    let report = dir.path().join("results.json");
    mailer.export_results(&report)?;
    let exported: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report)?)?;
    assert_eq!(exported.as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_broadcast_to_discord_and_telegram() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot1:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config: NotificationsConfig = serde_json::from_value(json!({
        "discord": { "webhook_url": format!("{}/api/webhooks/1/token", server.uri()) },
        "telegram": { "bot_token": "1:abc", "chat_id": "99", "api_base": server.uri() }
    }))?;
    let manager = PluginManager::from_config(&config).await?;

    let results = manager
        .broadcast(&NotificationEvent::digest("Daily Digest", "**Top** stories", None))
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "discord");
    assert!(results[0].1.success);
    assert_eq!(results[1].0, "telegram");
    assert!(!results[1].1.success);
    assert!(results[1].1.error.as_deref().unwrap().contains("blocked"));

    manager.shutdown().await?;
    Ok(())
}
