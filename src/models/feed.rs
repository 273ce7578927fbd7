use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::product_key;

/// RSS/Atom feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Feed {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(url)]
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Feed {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: None,
            enabled: true,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedList {
    #[serde(default)]
    pub feeds: Vec<Feed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<String>,
    pub source: String,
    pub category: Option<String>,
    pub author: Option<String>,
    pub content_hash: String,
}

impl FeedItem {
    pub fn new(title: String, link: String, description: String, feed: &Feed) -> Self {
        let content_hash = product_key(&link);
        Self {
            title,
            link,
            description,
            published: None,
            source: feed.name.clone(),
            category: feed.category.clone(),
            author: None,
            content_hash,
        }
    }

    /// Publication time from RFC 2822 (RSS) or RFC 3339 (Atom) dates.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.published.as_deref()?.trim();
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
