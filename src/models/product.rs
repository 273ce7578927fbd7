use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::product_key;

/// A page whose price is watched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Product {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub price_selector: String,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    #[serde(default)]
    pub alert_on_any_change: bool,
    #[serde(default = "default_threshold")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub alert_threshold_percent: f64,
}

fn default_threshold() -> f64 {
    5.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductList {
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Product {
    pub fn new(url: impl Into<String>, name: impl Into<String>, price_selector: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            price_selector: price_selector.into(),
            target_price: None,
            alert_on_any_change: false,
            alert_threshold_percent: default_threshold(),
        }
    }

    pub fn with_target_price(mut self, target: Decimal) -> Self {
        self.target_price = Some(target);
        self
    }

    pub fn with_threshold(mut self, percent: f64) -> Self {
        self.alert_threshold_percent = percent;
        self
    }

    pub fn alert_on_any_change(mut self, enabled: bool) -> Self {
        self.alert_on_any_change = enabled;
        self
    }

    pub fn key(&self) -> String {
        product_key(&self.url)
    }
}
