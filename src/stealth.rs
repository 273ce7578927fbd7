//! Browser settings that suppress automation-detectable signals, human-like
//! pacing, and cookie persistence across runs.

use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::Result;
use crate::config::ScraperConfig;
use crate::utils::fs::write_json;

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const LAUNCH_ARGS: [&str; 6] = [
    "--disable-blink-features=AutomationControlled",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-infobars",
];

const INIT_SCRIPTS: [&str; 5] = [
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });",
    "Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });",
    "Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });",
    "window.chrome = window.chrome || { runtime: {} };",
    r#"(() => {
        const originalQuery = window.navigator.permissions.query;
        window.navigator.permissions.query = (parameters) => (
            parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery(parameters)
        );
    })();"#,
];

#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub user_agents: Vec<String>,
    pub launch_args: Vec<String>,
    pub init_scripts: Vec<String>,
    pub viewport: (u32, u32),
    pub accept_language: String,
    /// Pause before navigating and around scrolling, in milliseconds.
    pub human_delay_ms: (u64, u64),
    /// Pause between consecutive pages, in milliseconds.
    pub page_delay_ms: (u64, u64),
}

impl Default for StealthProfile {
    fn default() -> Self {
        Self {
            user_agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            launch_args: LAUNCH_ARGS.iter().map(|arg| arg.to_string()).collect(),
            init_scripts: INIT_SCRIPTS.iter().map(|js| js.to_string()).collect(),
            viewport: (1920, 1080),
            accept_language: "en-US,en;q=0.9".to_string(),
            human_delay_ms: (500, 1500),
            page_delay_ms: (2000, 5000),
        }
    }
}

impl StealthProfile {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            human_delay_ms: (config.human_delay_min_ms, config.human_delay_max_ms),
            ..Self::default()
        }
    }

    pub fn random_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(USER_AGENTS[0])
    }

    pub fn human_delay(&self) -> Duration {
        random_duration(self.human_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        random_duration(self.page_delay_ms)
    }

    pub fn window_size_arg(&self) -> String {
        format!("--window-size={},{}", self.viewport.0, self.viewport.1)
    }
}

fn random_duration((min_ms, max_ms): (u64, u64)) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix seconds; non-positive for session cookies.
    #[serde(default)]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

impl StoredCookie {
    fn is_expired(&self, now: f64) -> bool {
        self.expires > 0.0 && self.expires < now
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let domain = self.domain.trim_start_matches('.');
        let domain_ok = host == domain || host.ends_with(&format!(".{}", domain));
        let path_ok = url.path().starts_with(&self.path);
        let scheme_ok = !self.secure || url.scheme() == "https";
        domain_ok && path_ok && scheme_ok
    }
}

/// Cookies saved to disk between runs.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    cookies: Vec<StoredCookie>,
}

impl SessionStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cookies = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), count = cookies.len(), "Loaded session cookies");
        Ok(Self { path, cookies })
    }

    pub fn cookies(&self) -> &[StoredCookie] {
        &self.cookies
    }

    /// Replaces cookies sharing name, domain and path; keeps the rest.
    pub fn replace(&mut self, fresh: Vec<StoredCookie>) {
        for cookie in fresh {
            self.cookies
                .retain(|c| !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path));
            self.cookies.push(cookie);
        }
    }

    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.cookies)
    }

    /// `Cookie` header value for `url`, or `None` when nothing applies.
    pub fn cookie_header_for(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let now = Utc::now().timestamp() as f64;
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches(&url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() { None } else { Some(pairs.join("; ")) }
    }
}
