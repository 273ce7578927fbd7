use roxmltree::{Document, Node};

use crate::models::{Feed, FeedItem};
use crate::{AppError, Result};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Parses RSS 2.0 `<item>`s and Atom `<entry>`s from `xml`.
pub fn parse_feed(xml: &str, feed: &Feed, description_limit: usize) -> Result<Vec<FeedItem>> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element().tag_name().name();
    if !matches!(root, "rss" | "feed" | "RDF") {
        return Err(AppError::parse(format!("Unrecognised feed root <{}> in {}", root, feed.name)));
    }

    let mut items: Vec<FeedItem> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "item" && n.tag_name().namespace() != Some(ATOM_NS))
        .map(|n| parse_rss_item(n, feed, description_limit))
        .collect();

    items.extend(
        doc.descendants()
            .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
            .map(|n| parse_atom_entry(n, feed, description_limit)),
    );

    Ok(items)
}

fn parse_rss_item(item: Node, feed: &Feed, limit: usize) -> FeedItem {
    let title = plain_child_text(item, "title").unwrap_or_default();
    let link = plain_child_text(item, "link").unwrap_or_default();
    let description = plain_child_text(item, "description").unwrap_or_default();

    let mut entry = FeedItem::new(
        collapse_whitespace(&title),
        link.trim().to_string(),
        truncate(&strip_html(&description), limit),
        feed,
    );
    entry.published = plain_child_text(item, "pubDate").map(|d| d.trim().to_string());
    entry.author = plain_child_text(item, "author")
        .or_else(|| child_text(item, (DC_NS, "creator")))
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    entry
}

fn parse_atom_entry(entry: Node, feed: &Feed, limit: usize) -> FeedItem {
    let title = child_text(entry, (ATOM_NS, "title")).unwrap_or_default();

    let links: Vec<Node> = entry.children().filter(|n| n.has_tag_name((ATOM_NS, "link"))).collect();
    let link = links
        .iter()
        .find(|n| matches!(n.attribute("rel"), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|n| n.attribute("href"))
        .unwrap_or_default();

    let description = child_text(entry, (ATOM_NS, "summary"))
        .filter(|s| !s.trim().is_empty())
        .or_else(|| child_text(entry, (ATOM_NS, "content")))
        .unwrap_or_default();

    let mut item = FeedItem::new(
        collapse_whitespace(&title),
        link.trim().to_string(),
        truncate(&strip_html(&description), limit),
        feed,
    );
    item.published = child_text(entry, (ATOM_NS, "published"))
        .or_else(|| child_text(entry, (ATOM_NS, "updated")))
        .map(|d| d.trim().to_string());
    item.author = entry
        .children()
        .find(|n| n.has_tag_name((ATOM_NS, "author")))
        .and_then(|author| child_text(author, (ATOM_NS, "name")))
        .map(|a| a.trim().to_string());
    item
}

fn text_of(node: Node) -> String {
    node.descendants().filter(|n| n.is_text()).filter_map(|n| n.text()).collect()
}

fn child_text(node: Node, name: (&str, &str)) -> Option<String> {
    node.children().find(|n| n.has_tag_name(name)).map(text_of)
}

/// Child without a namespace, so `<atom:link>` inside an RSS item is ignored.
fn plain_child_text(node: Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name && n.tag_name().namespace().is_none())
        .map(text_of)
}

/// Removes markup and decodes entities, leaving single-spaced text.
pub fn strip_html(fragment: &str) -> String {
    let html = ::scraper::Html::parse_fragment(fragment);
    let text: String = html.root_element().text().collect();
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Example</title>
    <atom:link href="https://example.com/feed" rel="self"/>
    <item>
      <title>  Rust 2026   released </title>
      <link>https://example.com/rust</link>
      <description><![CDATA[<p>The <b>new</b> edition &amp; more</p>]]></description>
      <pubDate>Tue, 10 Feb 2026 08:30:00 +0000</pubDate>
      <dc:creator>Ferris</dc:creator>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/second</link>
      <description>&lt;i&gt;escaped&lt;/i&gt; markup</description>
      <author>editor@example.com</author>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <entry>
    <title>Atom entry</title>
    <link rel="self" href="https://example.com/self"/>
    <link rel="alternate" href="https://example.com/atom-entry"/>
    <summary></summary>
    <content type="html">&lt;p&gt;Full content&lt;/p&gt;</content>
    <updated>2026-02-11T09:00:00Z</updated>
    <author><name>Jane Doe</name></author>
  </entry>
</feed>"#;

    fn feed() -> Feed {
        Feed::new("Example", "https://example.com/feed").with_category("tech")
    }

    #[test]
    fn test_parse_rss() {
        let items = parse_feed(RSS, &feed(), 500).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "Rust 2026 released");
        assert_eq!(first.link, "https://example.com/rust");
        assert_eq!(first.description, "The new edition & more");
        assert_eq!(first.author.as_deref(), Some("Ferris"));
        assert_eq!(first.category.as_deref(), Some("tech"));
        assert!(first.published_at().is_some());

        assert_eq!(items[1].description, "escaped markup");
        assert_eq!(items[1].author.as_deref(), Some("editor@example.com"));
    }

    #[test]
    fn test_parse_atom() {
        let items = parse_feed(ATOM, &feed(), 500).unwrap();
        assert_eq!(items.len(), 1);

        let entry = &items[0];
        assert_eq!(entry.link, "https://example.com/atom-entry");
        assert_eq!(entry.description, "Full content");
        assert_eq!(entry.published.as_deref(), Some("2026-02-11T09:00:00Z"));
        assert_eq!(entry.author.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_description_truncated() {
        let items = parse_feed(RSS, &feed(), 7).unwrap();
        assert_eq!(items[0].description, "The new");
    }

    #[test]
    fn test_rejects_non_feed_documents() {
        assert!(matches!(parse_feed("<html><body/></html>", &feed(), 500), Err(AppError::Parse { .. })));
        assert!(matches!(parse_feed("not xml at all", &feed(), 500), Err(AppError::Xml(_))));
    }
}
