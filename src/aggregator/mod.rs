//! RSS/Atom aggregation with cross-run deduplication and digest rendering.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::config::AppConfig;
use crate::models::{Feed, FeedItem, FeedList};
use crate::scraper::{HttpFetcher, PageFetcher};
use crate::utils::fs::{load_document, write_json};
use crate::Result;

pub mod digest;
pub mod parser;
pub mod seen;

pub use digest::create_digest;
pub use parser::parse_feed;
pub use seen::SeenStore;

pub struct FeedAggregator {
    fetcher: Arc<dyn PageFetcher>,
    feeds: Vec<Feed>,
    seen: SeenStore,
    description_limit: usize,
}

impl FeedAggregator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, seen: SeenStore, description_limit: usize) -> Self {
        Self {
            fetcher,
            feeds: Vec::new(),
            seen,
            description_limit,
        }
    }

    /// Feeds are always fetched over plain HTTP, never through the browser.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.scraper)?);
        let seen = SeenStore::load(config.aggregator.cache_dir.as_deref())?;
        Ok(Self::new(fetcher, seen, config.aggregator.description_limit))
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn add_feed(&mut self, feed: Feed) -> Result<()> {
        feed.validate()?;
        self.feeds.push(feed);
        Ok(())
    }

    pub fn add_feeds_from_file(&mut self, path: &Path) -> Result<usize> {
        let list: FeedList = load_document(path)?;
        let count = list.feeds.len();
        for feed in list.feeds {
            self.add_feed(feed)?;
        }
        Ok(count)
    }

    pub async fn fetch_feed(&self, feed: &Feed) -> Result<Vec<FeedItem>> {
        let page = self.fetcher.fetch(&feed.url).await?;
        parse_feed(&page.html, feed, self.description_limit)
    }

    /// Fetches every enabled feed, deduplicated by content hash.
    ///
    /// With `only_new`, items already in the seen store are dropped and the
    /// remainder is recorded as seen.
    pub async fn fetch_all(&mut self, only_new: bool) -> Result<Vec<FeedItem>> {
        let mut all_items = Vec::new();

        for feed in self.feeds.iter().filter(|f| f.enabled) {
            info!(feed = %feed.name, "Fetching feed");
            match self.fetch_feed(feed).await {
                Ok(items) => all_items.extend(items),
                Err(e) => warn!(feed = %feed.name, url = %feed.url, error = %e, "Feed fetch failed"),
            }
        }

        let mut batch = HashSet::new();
        all_items.retain(|item| batch.insert(item.content_hash.clone()));

        if only_new {
            all_items.retain(|item| !self.seen.contains(&item.content_hash));
            for item in &all_items {
                self.seen.insert(item.content_hash.clone());
            }
            self.seen.save()?;
        }

        metrics::counter!("lookout_feed_items_total").increment(all_items.len() as u64);
        info!(items = all_items.len(), only_new, "Feed fetch complete");
        Ok(all_items)
    }
}

/// Items whose title or description contains any keyword, ignoring case.
pub fn search(items: &[FeedItem], keywords: &[String]) -> Vec<FeedItem> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    items
        .iter()
        .filter(|item| {
            let text = format!("{} {}", item.title, item.description).to_lowercase();
            keywords.iter().any(|k| text.contains(k.as_str()))
        })
        .cloned()
        .collect()
}

pub fn filter_by_category(items: &[FeedItem], category: &str) -> Vec<FeedItem> {
    items
        .iter()
        .filter(|item| item.category.as_deref() == Some(category))
        .cloned()
        .collect()
}

/// Newest first; items without a parsable date keep their order at the end.
pub fn sort_by_recency(items: &mut [FeedItem]) {
    items.sort_by_key(|item| Reverse(item.published_at()));
}

pub fn export_items(items: &[FeedItem], path: &Path) -> Result<()> {
    write_json(path, items)?;
    info!(path = %path.display(), count = items.len(), "Exported feed items");
    Ok(())
}

fn preset(feeds: &[(&str, &str)], category: &str) -> Vec<Feed> {
    feeds
        .iter()
        .map(|(name, url)| Feed::new(*name, *url).with_category(category))
        .collect()
}

pub fn tech_feeds() -> Vec<Feed> {
    preset(
        &[
            ("TechCrunch", "https://techcrunch.com/feed/"),
            ("Hacker News", "https://hnrss.org/frontpage"),
            ("The Verge", "https://www.theverge.com/rss/index.xml"),
            ("Ars Technica", "https://feeds.arstechnica.com/arstechnica/technology-lab"),
        ],
        "tech",
    )
}

pub fn finance_feeds() -> Vec<Feed> {
    preset(
        &[
            ("Bloomberg Markets", "https://www.bloomberg.com/feed/podcast/bloomberg-surveillance.xml"),
            ("CNBC", "https://www.cnbc.com/id/100727362/device/rss/rss.html"),
        ],
        "finance",
    )
}

pub fn ai_feeds() -> Vec<Feed> {
    preset(
        &[
            ("OpenAI Blog", "https://openai.com/blog/rss.xml"),
            ("AI News", "https://www.artificialintelligence-news.com/feed/"),
        ],
        "ai",
    )
}
