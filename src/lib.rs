pub mod aggregator;
pub mod config;
pub mod history;
pub mod mailer;
pub mod models;
pub mod monitor;
pub mod plugins;
pub mod price_parser;
pub mod scraper;
pub mod stealth;
pub mod templates;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
