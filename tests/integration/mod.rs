// Integration tests for Lookout
// These tests drive the public API against wiremock servers and temp directories

pub mod aggregator_tests;
pub mod messaging_tests;
pub mod price_monitor_tests;

use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lookout::AppConfig;

/// Test configuration: plain HTTP, no retries, no delays, all state under `dir`.
pub fn get_test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.scraper.retry_attempts = 0;
    config.scraper.retry_delay_ms = 1;
    config.scraper.request_timeout = 5;
    config.monitor.data_dir = dir.join("price_data");
    config.monitor.request_delay_ms = 0;
    config.aggregator.cache_dir = Some(dir.join("feed_cache"));
    config.mailer.rate_limit_ms = 0;
    config
}

pub fn product_page(price: &str) -> String {
    format!(
        r#"<html lang="en"><body><h1>Widget</h1><span class="price">{}</span></body></html>"#,
        price
    )
}

/// Serves `body` once at `route`, after any earlier mounts are exhausted.
pub async fn serve_once(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write test fixture");
    path
}
