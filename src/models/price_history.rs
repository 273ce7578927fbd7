use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::models::{AlertType, product_key};

/// A single price observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub url: String,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

impl PriceRecord {
    pub fn new(url: impl Into<String>, name: impl Into<String>, price: Decimal, currency: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            price,
            currency: currency.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn key(&self) -> String {
        product_key(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceAlert {
    pub product: String,
    pub url: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub currency: String,
    pub change_percent: f64,
    pub alert_type: AlertType,
    pub timestamp: DateTime<Utc>,
}

impl PriceAlert {
    pub fn is_decrease(&self) -> bool {
        self.new_price < self.old_price
    }
}

/// Signed percentage change from `old` to `new`; zero when `old` is zero.
pub fn percent_change(old: Decimal, new: Decimal) -> Decimal {
    if old.is_zero() {
        return Decimal::ZERO;
    }
    (new - old) / old * Decimal::ONE_HUNDRED
}

pub fn percent_change_f64(old: Decimal, new: Decimal) -> f64 {
    percent_change(old, new).to_f64().unwrap_or(0.0)
}
