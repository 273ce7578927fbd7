use rust_decimal::Decimal;
use std::str::FromStr;
use wiremock::MockServer;

use lookout::history::{PriceHistoryStore, import_csv};
use lookout::models::{AlertType, Product};
use lookout::monitor::PriceMonitor;

use super::{get_test_config, product_page, serve_once, write_file};

#[tokio::test]
async fn test_target_price_alert_across_runs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    serve_once(&server, "/widget", product_page("$99.99")).await;
    serve_once(&server, "/widget", product_page("$74.50")).await;

    let config = get_test_config(dir.path());
    let products = write_file(
        dir.path(),
        "products.json",
        &format!(
            r#"{{"products": [{{"url": "{}/widget", "name": "Widget", "price_selector": ".price", "target_price": "80.00"}}]}}"#,
            server.uri()
        ),
    );

    let mut monitor = PriceMonitor::from_config(&config)?;
    monitor.add_products_from_file(&products)?;
    let first = monitor.check_all().await?;
    assert!(first[0].success());
    assert!(first[0].alert.is_none(), "first observation never alerts");

    // A fresh monitor reloads the saved history from disk.
    let mut monitor = PriceMonitor::from_config(&config)?;
    monitor.add_products_from_file(&products)?;
    let alerts = monitor.check_all_alerts().await?;

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::TargetReached);
    assert_eq!(alerts[0].old_price, Decimal::from_str("99.99")?);
    assert_eq!(alerts[0].new_price, Decimal::from_str("74.50")?);
    assert_eq!(monitor.get_price_history(&format!("{}/widget", server.uri())).len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_product_does_not_stop_others() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    serve_once(&server, "/ok", product_page("€12,50")).await;

    let mut monitor = PriceMonitor::from_config(&get_test_config(dir.path()))?;
    monitor.add_product(Product::new(format!("{}/missing", server.uri()), "Missing", ".price"))?;
    monitor.add_product(Product::new(format!("{}/ok", server.uri()), "Ok", ".price"))?;

    let results = monitor.check_all().await?;
    assert!(!results[0].success());
    assert!(results[0].error.is_some());

    let record = results[1].record.as_ref().unwrap();
    assert_eq!(record.currency, "EUR");
    assert_eq!(record.price, Decimal::from_str("12.50")?);
    Ok(())
}

#[tokio::test]
async fn test_missing_selector_is_reported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    serve_once(&server, "/widget", product_page("$10.00")).await;

    let mut monitor = PriceMonitor::from_config(&get_test_config(dir.path()))?;
    monitor.add_product(Product::new(format!("{}/widget", server.uri()), "Widget", "#nope"))?;

    let results = monitor.check_all().await?;
    assert!(results[0].error.as_deref().unwrap().contains("#nope"));
    assert!(monitor.store().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_export_then_import_history() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start().await;
    serve_once(&server, "/widget", product_page("$19.99")).await;

    let config = get_test_config(dir.path());
    let mut monitor = PriceMonitor::from_config(&config)?;
    monitor.add_product(Product::new(format!("{}/widget", server.uri()), "Widget", ".price"))?;
    monitor.check_all().await?;

    let csv = dir.path().join("prices.csv");
    assert_eq!(monitor.store().export_csv(&csv)?, 1);

    let mut other = PriceHistoryStore::open(dir.path().join("other"), 100)?;
    other.extend(import_csv(&csv)?);
    let imported: Vec<_> = other.all_records().collect();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].name, "Widget");
    assert_eq!(imported[0].price, Decimal::from_str("19.99")?);
    Ok(())
}
