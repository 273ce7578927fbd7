use chrono::NaiveDate;

use crate::models::{DigestFormat, FeedItem};
use crate::utils::html::escape;

const TEXT_DESCRIPTION_LIMIT: usize = 200;

/// Renders at most `max_items` items as a dated digest.
pub fn create_digest(items: &[FeedItem], max_items: usize, format: DigestFormat, date: NaiveDate) -> String {
    let items = &items[..items.len().min(max_items)];
    let date = date.format("%Y-%m-%d").to_string();

    match format {
        DigestFormat::Markdown => markdown(items, &date),
        DigestFormat::Html => html(items, &date),
        DigestFormat::Text => text(items, &date),
    }
}

fn markdown(items: &[FeedItem], date: &str) -> String {
    let mut lines = vec![format!("# Content Digest - {}\n", date)];

    for (i, item) in items.iter().enumerate() {
        lines.push(format!("## {}. {}", i + 1, item.title));
        lines.push(format!("*Source: {}*", item.source));
        if let Some(author) = &item.author {
            lines.push(format!("*Author: {}*", author));
        }
        lines.push(format!("\n{}\n", item.description));
        lines.push(format!("[Read more]({})\n", item.link));
        lines.push("---\n".to_string());
    }

    lines.join("\n")
}

fn html(items: &[FeedItem], date: &str) -> String {
    let mut parts = vec![format!("<h1>Content Digest - {}</h1>", date)];

    for (i, item) in items.iter().enumerate() {
        parts.push(format!("<h2>{}. {}</h2>", i + 1, escape(&item.title)));
        parts.push(format!("<p><em>Source: {}</em></p>", escape(&item.source)));
        parts.push(format!("<p>{}</p>", escape(&item.description)));
        parts.push(format!("<p><a href='{}'>Read more</a></p>", escape(&item.link)));
        parts.push("<hr>".to_string());
    }

    parts.join("\n")
}

fn text(items: &[FeedItem], date: &str) -> String {
    let mut lines = vec![format!("CONTENT DIGEST - {}\n", date), format!("{}\n", "=".repeat(50))];

    for (i, item) in items.iter().enumerate() {
        let description: String = item.description.chars().take(TEXT_DESCRIPTION_LIMIT).collect();
        lines.push(format!("{}. {}", i + 1, item.title));
        lines.push(format!("   Source: {}", item.source));
        lines.push(format!("   {}...", description));
        lines.push(format!("   Link: {}", item.link));
        lines.push(String::new());
    }

    lines.join("\n")
}
