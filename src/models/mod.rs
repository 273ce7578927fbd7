use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod feed;
pub mod guest;
pub mod price_history;
pub mod product;

// Re-exports for convenience
pub use feed::*;
pub use guest::*;
pub use price_history::*;
pub use product::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    TargetReached,
    Drop,
    Change,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertType::TargetReached => "target_reached",
            AlertType::Drop => "drop",
            AlertType::Change => "change",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DigestFormat {
    #[default]
    Markdown,
    Html,
    Text,
}

impl FromStr for DigestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(DigestFormat::Markdown),
            "html" => Ok(DigestFormat::Html),
            "text" | "txt" => Ok(DigestFormat::Text),
            other => Err(format!("unknown digest format '{}'", other)),
        }
    }
}

/// Short stable identifier for a URL: the first 12 hex digits of its UUIDv5.
pub fn product_key(url: &str) -> String {
    let mut key = Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
        .simple()
        .to_string();
    key.truncate(12);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_serialization() {
        assert_eq!(serde_json::to_string(&AlertType::TargetReached).unwrap(), "\"target_reached\"");
        assert_eq!(serde_json::from_str::<AlertType>("\"drop\"").unwrap(), AlertType::Drop);
        assert_eq!(AlertType::Change.to_string(), "change");
    }

    #[test]
    fn test_digest_format_parsing() {
        assert_eq!("markdown".parse::<DigestFormat>().unwrap(), DigestFormat::Markdown);
        assert_eq!("HTML".parse::<DigestFormat>().unwrap(), DigestFormat::Html);
        assert_eq!("txt".parse::<DigestFormat>().unwrap(), DigestFormat::Text);
        assert!("pdf".parse::<DigestFormat>().is_err());
    }

    #[test]
    fn test_product_key() {
        let a = product_key("https://shop.example.com/item/1");
        let b = product_key("https://shop.example.com/item/1");
        let c = product_key("https://shop.example.com/item/2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
