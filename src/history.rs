use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::Result;
use crate::models::{PriceRecord, product_key};
use crate::utils::fs::write_json;

pub const HISTORY_FILE: &str = "price_history.json";

/// Price observations per product key, newest last.
#[derive(Debug)]
pub struct PriceHistoryStore {
    path: PathBuf,
    limit: usize,
    records: BTreeMap<String, Vec<PriceRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Price")]
    price: Decimal,
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(rename = "Timestamp")]
    timestamp: DateTime<Utc>,
}

impl From<&PriceRecord> for CsvRow {
    fn from(record: &PriceRecord) -> Self {
        Self {
            url: record.url.clone(),
            name: record.name.clone(),
            price: record.price,
            currency: record.currency.clone(),
            timestamp: record.timestamp,
        }
    }
}

impl From<CsvRow> for PriceRecord {
    fn from(row: CsvRow) -> Self {
        Self {
            url: row.url,
            name: row.name,
            price: row.price,
            currency: row.currency,
            timestamp: row.timestamp,
        }
    }
}

impl PriceHistoryStore {
    pub fn open(data_dir: impl AsRef<Path>, limit: usize) -> Result<Self> {
        let path = data_dir.as_ref().join(HISTORY_FILE);
        let records = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), products = records.len(), "Opened price history");
        Ok(Self { path, limit: limit.max(1), records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, record: PriceRecord) {
        let entries = self.records.entry(record.key()).or_default();
        entries.push(record);
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }
    }

    /// Merges records from another source, e.g. a CSV import. Each product's
    /// history stays in timestamp order and an observation already present
    /// (same timestamp and price) is skipped. Returns how many were added.
    pub fn extend(&mut self, records: impl IntoIterator<Item = PriceRecord>) -> usize {
        let mut added = 0;
        for record in records {
            let entries = self.records.entry(record.key()).or_default();
            let duplicate = entries
                .iter()
                .any(|e| e.timestamp == record.timestamp && e.price == record.price);
            if duplicate {
                continue;
            }
            let at = entries.partition_point(|e| e.timestamp <= record.timestamp);
            entries.insert(at, record);
            added += 1;
        }

        for entries in self.records.values_mut() {
            if entries.len() > self.limit {
                let excess = entries.len() - self.limit;
                entries.drain(..excess);
            }
        }
        added
    }

    pub fn last(&self, url: &str) -> Option<&PriceRecord> {
        self.records.get(&product_key(url)).and_then(|entries| entries.last())
    }

    pub fn history(&self, url: &str) -> &[PriceRecord] {
        self.records
            .get(&product_key(url))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every record, grouped by product key.
    pub fn all_records(&self) -> impl Iterator<Item = &PriceRecord> {
        self.records.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.records)?;
        debug!(path = %self.path.display(), "Saved price history");
        Ok(())
    }

    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        let mut count = 0;
        for record in self.all_records() {
            writer.serialize(CsvRow::from(record))?;
            count += 1;
        }
        writer.flush()?;

        info!(path = %path.display(), count, "Exported price history");
        Ok(count)
    }
}

pub fn import_csv(path: impl AsRef<Path>) -> Result<Vec<PriceRecord>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut records = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        records.push(row?.into());
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(url: &str, price: &str, minute: u32) -> PriceRecord {
        PriceRecord {
            url: url.to_string(),
            name: "Widget, large".to_string(),
            price: price.parse().unwrap(),
            currency: "USD".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_record_keeps_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PriceHistoryStore::open(dir.path(), 3).unwrap();

        for (i, price) in ["10", "11", "12", "13", "14"].iter().enumerate() {
            store.record(record("https://shop.example.com/a", price, i as u32));
        }

        let history = store.history("https://shop.example.com/a");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].price, "12".parse().unwrap());
        assert_eq!(store.last("https://shop.example.com/a").unwrap().price, "14".parse().unwrap());
        assert!(store.history("https://shop.example.com/other").is_empty());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        let mut store = PriceHistoryStore::open(&data_dir, 100).unwrap();
        store.record(record("https://shop.example.com/a", "19.99", 0));
        store.record(record("https://shop.example.com/b", "5.00", 1));
        store.save().unwrap();

        let reopened = PriceHistoryStore::open(&data_dir, 100).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.last("https://shop.example.com/a"), store.last("https://shop.example.com/a"));
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PriceHistoryStore::open(dir.path(), 100).unwrap();
        store.record(record("https://shop.example.com/a", "1299.99", 0));
        store.record(record("https://shop.example.com/a", "1249.50", 5));
        store.record(record("https://shop.example.com/b", "0.10", 7));

        let csv_path = dir.path().join("export/history.csv");
        assert_eq!(store.export_csv(&csv_path).unwrap(), 3);

        let header = std::fs::read_to_string(&csv_path).unwrap();
        assert!(header.starts_with("URL,Name,Price,Currency,Timestamp"));

        let imported = import_csv(&csv_path).unwrap();
        let original: Vec<PriceRecord> = store.all_records().cloned().collect();
        assert_eq!(imported, original);
    }

    #[test]
    fn test_import_merges_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = PriceHistoryStore::open(dir.path().join("a"), 100).unwrap();
        source.record(record("https://shop.example.com/a", "20", 0));
        let csv_path = dir.path().join("history.csv");
        source.export_csv(&csv_path).unwrap();

        let mut target = PriceHistoryStore::open(dir.path().join("b"), 100).unwrap();
        target.extend(import_csv(&csv_path).unwrap());

        assert_eq!(target.history("https://shop.example.com/a").len(), 1);
    }

    #[test]
    fn test_reimport_of_older_export_keeps_latest_observation() {
        let url = "https://shop.example.com/a";
        let dir = tempfile::tempdir().unwrap();

        let mut exported = PriceHistoryStore::open(dir.path().join("old"), 100).unwrap();
        exported.record(record(url, "100", 0));
        let csv_path = dir.path().join("history.csv");
        exported.export_csv(&csv_path).unwrap();

        let mut store = PriceHistoryStore::open(dir.path().join("live"), 100).unwrap();
        store.record(record(url, "90", 5));

        assert_eq!(store.extend(import_csv(&csv_path).unwrap()), 1);
        assert_eq!(store.extend(import_csv(&csv_path).unwrap()), 0);

        let history = store.history(url);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].price, "100".parse().unwrap());
        let last = store.last(url).unwrap();
        assert_eq!(last.price, "90".parse().unwrap());
        assert_eq!(last.timestamp, record(url, "90", 5).timestamp);

        let product = crate::models::Product::new(url, "Widget", ".price");
        let unchanged = record(url, "90", 10);
        assert!(crate::monitor::check_alert_conditions(&product, store.last(url), &unchanged).is_none());
    }

    #[test]
    fn test_extend_applies_limit_after_ordering() {
        let url = "https://shop.example.com/a";
        let dir = tempfile::tempdir().unwrap();
        let mut store = PriceHistoryStore::open(dir.path(), 2).unwrap();
        store.record(record(url, "30", 30));

        let added = store.extend(vec![record(url, "10", 10), record(url, "20", 20), record(url, "40", 40)]);

        assert_eq!(added, 3);
        let prices: Vec<String> = store.history(url).iter().map(|r| r.price.to_string()).collect();
        assert_eq!(prices, vec!["30", "40"]);
    }
}
