use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use url::Url;

use crate::models::DigestFormat;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub monitor: MonitorConfig,
    pub scraper: ScraperConfig,
    pub aggregator: AggregatorConfig,
    pub mailer: MailerConfig,
    pub messaging: MessagingConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "lookout.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub data_dir: PathBuf,
    pub products_file: PathBuf,
    pub request_delay_ms: u64,
    pub history_limit: usize,
    pub default_currency: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./price_data"),
            products_file: PathBuf::from("products.json"),
            request_delay_ms: 2000,
            history_limit: 100,
            default_currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub request_timeout: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Fetch through headless Chrome with the stealth profile instead of plain HTTP.
    pub use_browser: bool,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub session_file: Option<PathBuf>,
    pub human_delay_min_ms: u64,
    pub human_delay_max_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            request_timeout: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            use_browser: false,
            headless: true,
            chrome_path: None,
            session_file: None,
            human_delay_min_ms: 500,
            human_delay_max_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub feeds_file: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub max_items: usize,
    pub format: DigestFormat,
    pub description_limit: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            feeds_file: PathBuf::from("feeds.json"),
            cache_dir: Some(PathBuf::from("./feed_cache")),
            max_items: 10,
            format: DigestFormat::Markdown,
            description_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub rate_limit_ms: u64,
    pub email_column: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: 1000,
            email_column: "email".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub properties_file: PathBuf,
    pub templates_file: Option<PathBuf>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            properties_file: PathBuf::from("properties.json"),
            templates_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub smtp: Option<SmtpConfig>,
    pub discord: Option<DiscordConfig>,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Recipient for alert notifications; bulk mail takes recipients from its contact list.
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default = "default_true")]
    pub disable_preview: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Lookout".to_string()
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Layers `config/default`, `config/local`, an explicit file and `LOOKOUT__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let s = builder
            .add_source(Environment::with_prefix("LOOKOUT").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper request_timeout must be greater than 0".into()));
        }

        if self.scraper.user_agent.trim().is_empty() {
            return Err(ConfigError::Message("Scraper user_agent must not be empty".into()));
        }

        if self.scraper.human_delay_min_ms > self.scraper.human_delay_max_ms {
            return Err(ConfigError::Message("Scraper human_delay_min_ms cannot exceed human_delay_max_ms".into()));
        }

        if self.monitor.history_limit == 0 {
            return Err(ConfigError::Message("Monitor history_limit must be greater than 0".into()));
        }

        if self.monitor.default_currency.len() != 3 {
            return Err(ConfigError::Message("Monitor default_currency must be a 3-letter code".into()));
        }

        if self.aggregator.max_items == 0 {
            return Err(ConfigError::Message("Aggregator max_items must be greater than 0".into()));
        }

        if self.aggregator.description_limit == 0 {
            return Err(ConfigError::Message("Aggregator description_limit must be greater than 0".into()));
        }

        if let Some(smtp) = &self.notifications.smtp {
            if smtp.port == 0 {
                return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
            }
            if smtp.host.trim().is_empty() {
                return Err(ConfigError::Message("SMTP host must not be empty".into()));
            }
        }

        if let Some(discord) = &self.notifications.discord {
            if Url::parse(&discord.webhook_url).is_err() {
                return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
            }
        }

        if let Some(telegram) = &self.notifications.telegram {
            if Url::parse(&telegram.api_base).is_err() {
                return Err(ConfigError::Message("Invalid Telegram API base URL".into()));
            }
            if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
                return Err(ConfigError::Message("Telegram bot_token and chat_id are required".into()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.notifications.smtp = Some(SmtpConfig {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: Some("me@gmail.com".to_string()),
            password: Some("app-password".to_string()),
            from_address: "me@gmail.com".to_string(),
            from_name: "Lookout".to_string(),
            to_address: Some("alerts@example.com".to_string()),
            use_tls: true,
        });
        config.notifications.discord = Some(DiscordConfig {
            webhook_url: "https://discord.com/api/webhooks/123/abc".to_string(),
            username: None,
            avatar_url: None,
        });
        config
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(AppConfig::default().validate().is_ok());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = valid_config();
        config.scraper.request_timeout = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("request_timeout must be greater than 0"));
    }

    #[test]
    fn test_config_validation_delay_range() {
        let mut config = valid_config();
        config.scraper.human_delay_min_ms = 2000;
        config.scraper.human_delay_max_ms = 100;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("cannot exceed human_delay_max_ms"));
    }

    #[test]
    fn test_config_validation_history_limit() {
        let mut config = valid_config();
        config.monitor.history_limit = 0;

        assert!(config.validate().unwrap_err().to_string().contains("history_limit"));
    }

    #[test]
    fn test_config_validation_smtp_port() {
        let mut config = valid_config();
        if let Some(smtp) = config.notifications.smtp.as_mut() {
            smtp.port = 0;
        }

        assert!(config.validate().unwrap_err().to_string().contains("SMTP port must be greater than 0"));
    }

    #[test]
    fn test_config_validation_invalid_webhook() {
        let mut config = valid_config();
        config.notifications.discord = Some(DiscordConfig {
            webhook_url: "not-a-url".to_string(),
            username: None,
            avatar_url: None,
        });

        assert!(config.validate().unwrap_err().to_string().contains("Invalid Discord webhook"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookout.toml");
        std::fs::write(
            &path,
            r#"
[monitor]
data_dir = "/tmp/prices"
request_delay_ms = 250

[aggregator]
format = "html"
max_items = 5

[notifications.telegram]
bot_token = "123:abc"
chat_id = "42"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.monitor.data_dir, PathBuf::from("/tmp/prices"));
        assert_eq!(config.monitor.request_delay_ms, 250);
        assert_eq!(config.monitor.history_limit, 100);
        assert_eq!(config.aggregator.format, DigestFormat::Html);
        assert_eq!(config.aggregator.max_items, 5);

        let telegram = config.notifications.telegram.unwrap();
        assert_eq!(telegram.api_base, "https://api.telegram.org");
        assert!(telegram.disable_preview);
        assert!(config.notifications.smtp.is_none());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = AppConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(result.is_err());
    }
}
