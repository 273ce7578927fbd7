use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument;
use headless_chrome::{Browser, LaunchOptions, Tab};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::stealth::{SessionStore, StealthProfile, StoredCookie};
use crate::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    /// After redirects
    pub final_url: String,
    pub html: String,
    pub status: Option<u16>,
    pub response_time_ms: u64,
}

/// Source of rendered page HTML.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Builds the fetcher selected by `scraper.use_browser`.
pub fn fetcher_from_config(config: &ScraperConfig) -> Result<Arc<dyn PageFetcher>> {
    if config.use_browser {
        Ok(Arc::new(BrowserFetcher::new(config.clone())?))
    } else {
        Ok(Arc::new(HttpFetcher::new(config)?))
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
    retry_attempts: usize,
    retry_delay_ms: u64,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            retry_attempts: config.retry_attempts as usize,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    // First retry waits roughly `retry_delay_ms`, then doubles.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor((self.retry_delay_ms / 2).max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.retry_attempts)
    }
}

/// Connection failures, timeouts, 5xx and 429 are worth another attempt.
fn is_transient(error: &reqwest::Error) -> bool {
    match error.status() {
        Some(status) => status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        None => error.is_connect() || error.is_timeout() || error.is_request(),
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let start = Instant::now();

        let response = RetryIf::start(
            self.backoff(),
            || async move {
                let result = self.client.get(url).send().await.and_then(|r| r.error_for_status());
                if let Err(e) = &result {
                    debug!(url, error = %e, "HTTP fetch attempt failed");
                }
                result
            },
            is_transient,
        )
        .await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response.text().await?;

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            html,
            status: Some(status),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Headless Chrome with the stealth profile applied to every tab.
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    profile: StealthProfile,
    session: Option<Arc<Mutex<SessionStore>>>,
    wait_for: Option<String>,
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let profile = StealthProfile::from_config(&config);

        let window_size = profile.window_size_arg();
        let mut args: Vec<&OsStr> = profile.launch_args.iter().map(OsStr::new).collect();
        args.push(OsStr::new(&window_size));

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .path(config.chrome_path.as_ref().map(PathBuf::from))
            .args(args)
            .build()
            .map_err(|e| AppError::Scraping(format!("Failed to create launch options: {}", e)))?;

        let browser =
            Browser::new(launch_options).map_err(|e| AppError::Scraping(format!("Failed to launch browser: {}", e)))?;
        info!(headless = config.headless, "Launched headless browser");

        let session = match &config.session_file {
            Some(path) => Some(Arc::new(Mutex::new(SessionStore::load(path)?))),
            None => None,
        };

        Ok(Self {
            browser: Arc::new(browser),
            profile,
            session,
            wait_for: None,
            timeout: Duration::from_secs(config.request_timeout),
        })
    }

    /// Waits for `selector` to appear before capturing the page.
    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let browser = Arc::clone(&self.browser);
        let profile = self.profile.clone();
        let session = self.session.clone();
        let wait_for = self.wait_for.clone();
        let timeout = self.timeout;
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            stealth_fetch(&browser, &profile, session.as_deref(), wait_for.as_deref(), timeout, &url)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Browser task failed: {}", e)))?
    }
}

fn chrome_err(context: &str) -> impl Fn(anyhow::Error) -> AppError + '_ {
    move |e| AppError::Scraping(format!("{}: {}", context, e))
}

/// The tab operations used before a page starts loading.
#[cfg_attr(test, mockall::automock)]
trait BrowserPage {
    fn set_identity(&self, user_agent: &str, accept_language: &str) -> anyhow::Result<()>;
    /// Runs `source` in every new document ahead of the page's own scripts.
    fn add_init_script(&self, source: &str) -> anyhow::Result<()>;
    fn set_cookie_header(&self, cookies: &str) -> anyhow::Result<()>;
    fn navigate(&self, url: &str) -> anyhow::Result<()>;
    fn close(&self);
}

impl BrowserPage for Tab {
    fn set_identity(&self, user_agent: &str, accept_language: &str) -> anyhow::Result<()> {
        self.set_user_agent(user_agent, Some(accept_language), None)?;
        self.enable_stealth_mode()
    }

    fn add_init_script(&self, source: &str) -> anyhow::Result<()> {
        self.call_method(AddScriptToEvaluateOnNewDocument {
            source: source.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })?;
        Ok(())
    }

    fn set_cookie_header(&self, cookies: &str) -> anyhow::Result<()> {
        let mut headers = HashMap::new();
        headers.insert("Cookie", cookies);
        self.set_extra_http_headers(headers)
    }

    fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.navigate_to(url)?.wait_until_navigated()?;
        Ok(())
    }

    fn close(&self) {
        if let Err(e) = Tab::close(self, true) {
            debug!(error = %e, "Failed to close tab");
        }
    }
}

/// Closes the tab when dropped, whichever way the fetch ends.
struct PageGuard<P: BrowserPage>(Arc<P>);

impl<P: BrowserPage> Deref for PageGuard<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.0
    }
}

impl<P: BrowserPage> Drop for PageGuard<P> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Applies the stealth profile and loads `url`. Init scripts are registered
/// before navigation so they run ahead of any script on the page.
fn open_page<P: BrowserPage + ?Sized>(
    page: &P,
    profile: &StealthProfile,
    cookie_header: Option<&str>,
    url: &str,
) -> Result<()> {
    page.set_identity(profile.random_user_agent(), &profile.accept_language)
        .map_err(chrome_err("Failed to apply browser identity"))?;

    for script in &profile.init_scripts {
        page.add_init_script(script)
            .map_err(chrome_err("Failed to register init script"))?;
    }

    if let Some(cookies) = cookie_header {
        page.set_cookie_header(cookies)
            .map_err(chrome_err("Failed to restore session cookies"))?;
    }

    std::thread::sleep(profile.human_delay());

    page.navigate(url).map_err(chrome_err("Navigation failed"))
}

fn stealth_fetch(
    browser: &Browser,
    profile: &StealthProfile,
    session: Option<&Mutex<SessionStore>>,
    wait_for: Option<&str>,
    timeout: Duration,
    url: &str,
) -> Result<FetchedPage> {
    let start = Instant::now();
    let tab = PageGuard(browser.new_tab().map_err(chrome_err("Failed to create tab"))?);

    let cookie_header = match session {
        Some(store) => lock(store)?.cookie_header_for(url),
        None => None,
    };
    open_page(&*tab, profile, cookie_header.as_deref(), url)?;

    simulate_reading(&tab, profile);

    if let Some(selector) = wait_for {
        tab.wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| AppError::ElementNotFound { selector: format!("{} ({})", selector, e) })?;
    }

    let html = tab.get_content().map_err(chrome_err("Failed to get page content"))?;
    let final_url = {
        let current = tab.get_url();
        if current.is_empty() { url.to_string() } else { current }
    };

    if let Some(store) = session {
        match tab.get_cookies() {
            Ok(cookies) => {
                let fresh = cookies
                    .into_iter()
                    .map(|c| StoredCookie {
                        name: c.name,
                        value: c.value,
                        domain: c.domain,
                        path: c.path,
                        expires: c.expires,
                        http_only: c.http_only,
                        secure: c.secure,
                    })
                    .collect();
                let mut store = lock(store)?;
                store.replace(fresh);
                store.save()?;
            }
            Err(e) => warn!(url, error = %e, "Could not read cookies for session"),
        }
    }

    Ok(FetchedPage {
        url: url.to_string(),
        final_url,
        html,
        status: None,
        response_time_ms: start.elapsed().as_millis() as u64,
    })
}

fn simulate_reading(tab: &Tab, profile: &StealthProfile) {
    std::thread::sleep(profile.human_delay());
    if let Err(e) = tab.evaluate("window.scrollTo(0, document.body.scrollHeight / 3);", false) {
        debug!(error = %e, "Scroll failed");
    }
    std::thread::sleep(profile.human_delay());
}

fn lock(store: &Mutex<SessionStore>) -> Result<std::sync::MutexGuard<'_, SessionStore>> {
    store
        .lock()
        .map_err(|_| AppError::Internal("Session store lock poisoned".to_string()))
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Validation(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first element matching `selector` whose text is non-empty.
pub fn extract_text(html: &str, selector: &str) -> Result<Option<String>> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty()))
}

pub fn extract_all(html: &str, selector: &str) -> Result<Vec<String>> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect())
}

/// The `lang` attribute of the root `<html>` element.
pub fn page_lang(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .root_element()
        .value()
        .attr("lang")
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
}
