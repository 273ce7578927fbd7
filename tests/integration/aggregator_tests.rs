use chrono::NaiveDate;
use wiremock::MockServer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use lookout::aggregator::{self, FeedAggregator, create_digest};
use lookout::models::{DigestFormat, Feed};

use super::{get_test_config, write_file};

const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Tech</title>
  <item><title>Rust 2.0 announced</title><link>https://news.example.com/rust</link>
        <description>&lt;p&gt;Big &lt;b&gt;news&lt;/b&gt;&lt;/p&gt;</description>
        <pubDate>Tue, 10 Feb 2026 08:30:00 +0000</pubDate></item>
  <item><title>Gardening tips</title><link>https://news.example.com/garden</link>
        <description>Tomatoes</description>
        <pubDate>Mon, 09 Feb 2026 08:30:00 +0000</pubDate></item>
</channel></rss>"#;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>Blog</title>
  <entry><title>Async closures stabilised</title>
         <link href="https://blog.example.com/async"/>
         <summary>Rust async news</summary>
         <updated>2026-02-11T09:00:00Z</updated></entry>
  <entry><title>Rust 2.0 announced</title>
         <link href="https://news.example.com/rust"/>
         <summary>Duplicate of the RSS item</summary></entry>
</feed>"#;

async fn feed_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atom"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_fetch_mixed_feeds_and_digest() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = feed_server().await;
    let feeds = write_file(
        dir.path(),
        "feeds.json",
        &format!(
            r#"{{"feeds": [
                {{"name": "Tech", "url": "{0}/rss", "category": "tech"}},
                {{"name": "Blog", "url": "{0}/atom", "category": "blog"}},
                {{"name": "Down", "url": "{0}/gone"}}
            ]}}"#,
            server.uri()
        ),
    );

    let mut aggregator = FeedAggregator::from_config(&get_test_config(dir.path()))?;
    assert_eq!(aggregator.add_feeds_from_file(&feeds)?, 3);

    let mut items = aggregator.fetch_all(false).await?;
    assert_eq!(items.len(), 3, "duplicate title+link across feeds is dropped");

    aggregator::sort_by_recency(&mut items);
    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Async closures stabilised", "Rust 2.0 announced", "Gardening tips"]);
    assert_eq!(items[1].description, "Big news");

    let rust = aggregator::search(&items, &["rust".to_string()]);
    assert_eq!(rust.len(), 2);
    assert_eq!(aggregator::filter_by_category(&items, "blog").len(), 1);

    let date = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap();
    let digest = create_digest(&rust, 10, DigestFormat::Markdown, date);
    assert!(digest.contains("## 1. Async closures stabilised"));
    assert!(digest.contains("[Read more](https://blog.example.com/async)"));
    assert!(!digest.contains("Gardening"));
    Ok(())
}

#[tokio::test]
async fn test_only_new_persists_between_aggregators() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = feed_server().await;
    let config = get_test_config(dir.path());

    let mut first = FeedAggregator::from_config(&config)?;
    first.add_feed(Feed::new("Tech", format!("{}/rss", server.uri())))?;
    assert_eq!(first.fetch_all(true).await?.len(), 2);

    let mut second = FeedAggregator::from_config(&config)?;
    second.add_feed(Feed::new("Tech", format!("{}/rss", server.uri())))?;
    second.add_feed(Feed::new("Blog", format!("{}/atom", server.uri())))?;
    let fresh = second.fetch_all(true).await?;

    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].title, "Async closures stabilised");
    Ok(())
}
