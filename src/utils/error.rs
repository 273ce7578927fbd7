use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Feed XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Email error: {0}")]
    Email(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Plugin error: {plugin_type}: {message}")]
    Plugin { plugin_type: String, message: String },

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl AppError {
    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Parse { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound { resource: resource.into() }
    }

    pub fn plugin(plugin_type: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Plugin {
            plugin_type: plugin_type.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_plugin_error() {
        let err = AppError::plugin("telegram", "chat not found");
        assert_eq!(err.to_string(), "Plugin error: telegram: chat not found");
    }

    #[test]
    fn test_element_not_found_error() {
        let err = AppError::ElementNotFound {
            selector: ".a-price-whole".to_string(),
        };
        assert_eq!(err.to_string(), "Element not found: .a-price-whole");
    }

    #[test]
    fn test_not_found_error() {
        let err = AppError::not_found("property 'Lake House'");
        assert_eq!(err.to_string(), "Not found: property 'Lake House'");
    }
}
