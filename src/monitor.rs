use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::config::AppConfig;
use crate::history::PriceHistoryStore;
use crate::models::{AlertType, PriceAlert, PriceRecord, Product, ProductList, percent_change_f64};
use crate::price_parser::{PriceParser, WebsiteContext, format_price};
use crate::scraper::{self, PageFetcher, fetcher_from_config};
use crate::utils::fs::load_document;
use crate::{AppError, Result};

/// Smallest relative change reported by `alert_on_any_change`, in percent.
const MIN_CHANGE_PERCENT: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCheckResult {
    pub product: String,
    pub url: String,
    pub record: Option<PriceRecord>,
    pub alert: Option<PriceAlert>,
    pub error: Option<String>,
    pub response_time_ms: u64,
}

impl ProductCheckResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct PriceMonitor {
    fetcher: Arc<dyn PageFetcher>,
    parser: PriceParser,
    store: PriceHistoryStore,
    products: Vec<Product>,
    request_delay: Duration,
}

impl PriceMonitor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        parser: PriceParser,
        store: PriceHistoryStore,
        request_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            parser,
            store,
            products: Vec::new(),
            request_delay,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = fetcher_from_config(&config.scraper)?;
        let store = PriceHistoryStore::open(&config.monitor.data_dir, config.monitor.history_limit)?;
        Ok(Self::new(
            fetcher,
            PriceParser::new(&config.monitor.default_currency),
            store,
            Duration::from_millis(config.monitor.request_delay_ms),
        ))
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn store(&self) -> &PriceHistoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PriceHistoryStore {
        &mut self.store
    }

    pub fn add_product(&mut self, product: Product) -> Result<()> {
        product.validate()?;
        info!(product = %product.name, url = %product.url, "Added product");
        self.products.push(product);
        Ok(())
    }

    /// Loads `{"products": [...]}` JSON or `[[products]]` TOML.
    pub fn add_products_from_file(&mut self, path: &Path) -> Result<usize> {
        let list: ProductList = load_document(path)?;
        let count = list.products.len();
        for product in list.products {
            self.add_product(product)?;
        }
        Ok(count)
    }

    pub async fn scrape_price(&self, product: &Product) -> Result<PriceRecord> {
        self.scrape(product).await.map(|(record, _)| record)
    }

    async fn scrape(&self, product: &Product) -> Result<(PriceRecord, u64)> {
        let page = self.fetcher.fetch(&product.url).await?;

        let text = scraper::extract_text(&page.html, &product.price_selector)?.ok_or_else(|| {
            AppError::ElementNotFound {
                selector: product.price_selector.clone(),
            }
        })?;

        let context = WebsiteContext::new(page.final_url.clone(), scraper::page_lang(&page.html));
        let parsed = self
            .parser
            .parse(&text, Some(&context))
            .ok_or_else(|| AppError::parse(format!("No price found in '{}'", text)))?;

        debug!(product = %product.name, price = %parsed.amount, currency = %parsed.currency, "Scraped price");
        let record = PriceRecord::new(&product.url, &product.name, parsed.amount, parsed.currency);
        Ok((record, page.response_time_ms))
    }

    /// Scrapes one product, compares with its last stored price and records the new one.
    pub async fn check_product(&mut self, product: &Product) -> ProductCheckResult {
        let start = Instant::now();
        metrics::counter!("lookout_price_checks_total").increment(1);

        match self.scrape(product).await {
            Ok((record, response_time_ms)) => {
                let alert = check_alert_conditions(product, self.store.last(&product.url), &record);
                if let Some(alert) = &alert {
                    metrics::counter!("lookout_alerts_total", "type" => alert.alert_type.to_string()).increment(1);
                    info!(
                        product = %product.name,
                        alert_type = %alert.alert_type,
                        change_percent = alert.change_percent,
                        "Price alert"
                    );
                }
                self.store.record(record.clone());

                ProductCheckResult {
                    product: product.name.clone(),
                    url: product.url.clone(),
                    record: Some(record),
                    alert,
                    error: None,
                    response_time_ms,
                }
            }
            Err(e) => {
                warn!(product = %product.name, url = %product.url, error = %e, "Price check failed");
                ProductCheckResult {
                    product: product.name.clone(),
                    url: product.url.clone(),
                    record: None,
                    alert: None,
                    error: Some(e.to_string()),
                    response_time_ms: start.elapsed().as_millis() as u64,
                }
            }
        }
    }

    /// Checks every product in order and saves history once at the end.
    pub async fn check_all(&mut self) -> Result<Vec<ProductCheckResult>> {
        let products = self.products.clone();
        let mut results = Vec::with_capacity(products.len());

        for (idx, product) in products.iter().enumerate() {
            if idx > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            results.push(self.check_product(product).await);
        }

        self.store.save()?;

        let alerts = results.iter().filter(|r| r.alert.is_some()).count();
        let failed = results.iter().filter(|r| !r.success()).count();
        info!(checked = results.len(), alerts, failed, "Price check complete");
        Ok(results)
    }

    pub async fn check_all_alerts(&mut self) -> Result<Vec<PriceAlert>> {
        Ok(self.check_all().await?.into_iter().filter_map(|r| r.alert).collect())
    }

    pub fn get_price_history(&self, url: &str) -> &[PriceRecord] {
        self.store.history(url)
    }
}

/// Decides whether `current` warrants an alert against the last stored record.
pub fn check_alert_conditions(product: &Product, last: Option<&PriceRecord>, current: &PriceRecord) -> Option<PriceAlert> {
    let last = last?;
    if current.price == last.price {
        return None;
    }

    let change_percent = percent_change_f64(last.price, current.price);
    let drop_percent = -change_percent;

    let alert_type = match product.target_price {
        Some(target) if current.price <= target => AlertType::TargetReached,
        _ if drop_percent >= product.alert_threshold_percent => AlertType::Drop,
        _ if product.alert_on_any_change && change_percent.abs() > MIN_CHANGE_PERCENT => AlertType::Change,
        _ => return None,
    };

    Some(PriceAlert {
        product: product.name.clone(),
        url: product.url.clone(),
        old_price: last.price,
        new_price: current.price,
        currency: current.currency.clone(),
        change_percent,
        alert_type,
        timestamp: Utc::now(),
    })
}

/// Human-readable alert summary; empty when there is nothing to report.
pub fn format_alert_message(alerts: &[PriceAlert]) -> String {
    if alerts.is_empty() {
        return String::new();
    }

    let mut sections = vec!["🔔 Price Alerts!\n".to_string()];
    for alert in alerts {
        let arrow = if alert.change_percent < 0.0 { "📉" } else { "📈" };
        sections.push(format!(
            "{} **{}**\n   {} → {} ({:+.1}%)\n   Type: {}\n   Link: {}\n",
            arrow,
            alert.product,
            format_price(alert.old_price, &alert.currency),
            format_price(alert.new_price, &alert.currency),
            alert.change_percent,
            alert.alert_type,
            alert.url,
        ));
    }
    sections.join("\n")
}
