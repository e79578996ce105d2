//! Client configuration.
//!
//! The only externally-provided value is the API base URL; everything else
//! is set in code through the builder.

use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;

use crate::auth::store::TokenStoreConfig;
use crate::error::{DeskError, Result};

/// Environment variable holding the API base URL.
pub const BASE_URL_ENV: &str = "STOREDESK_API_URL";

/// Configuration for an [`ApiClient`](crate::client::ApiClient).
///
/// # Example
/// ```
/// use std::time::Duration;
/// use storedesk::config::DeskConfig;
///
/// let config = DeskConfig::builder()
///     .base_url("https://api.example.com/v1")
///     .request_timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.url_for("/orders"), "https://api.example.com/v1/orders");
/// ```
#[derive(Debug, Clone, Builder)]
pub struct DeskConfig {
    /// Prefix for every relative endpoint path.
    #[builder(into)]
    pub base_url: String,
    /// Upper bound for a single HTTP exchange.
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
    #[builder(into, default = "/auth/refresh".to_string())]
    pub refresh_path: String,
    /// How long a cache entry survives after its last subscriber goes away.
    #[builder(default = Duration::from_secs(60))]
    pub keep_unused_for: Duration,
    /// Directory for the file-backed token store.
    #[builder(default = TokenStoreConfig::default_dir())]
    pub token_dir: PathBuf,
}

impl DeskConfig {
    /// Load from the environment (a `.env` file is honoured when present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let base_url = std::env::var(BASE_URL_ENV).map_err(|_| {
            DeskError::Configuration(format!("{BASE_URL_ENV} is not set"))
        })?;
        let config = Self::builder().base_url(base_url).build();
        config.validate()?;
        Ok(config)
    }

    /// Check that the base URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| DeskError::Configuration(format!("invalid base URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeskError::Configuration(format!(
                "unsupported base URL scheme: {}",
                url.scheme()
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(DeskError::Configuration(
                "request timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Join the base URL and a relative path without losing a base path prefix.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            return base.to_string();
        }
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn token_store_config(&self) -> TokenStoreConfig {
        TokenStoreConfig::new(self.token_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = DeskConfig::builder().base_url("http://localhost:4000").build();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert_eq!(config.keep_unused_for, Duration::from_secs(60));
        config.validate().unwrap();
    }

    #[test]
    fn url_for_keeps_base_path() {
        let config = DeskConfig::builder()
            .base_url("https://api.example.com/admin/")
            .build();
        assert_eq!(
            config.url_for("/orders/42"),
            "https://api.example.com/admin/orders/42"
        );
        assert_eq!(config.url_for("hubs"), "https://api.example.com/admin/hubs");
    }

    #[test]
    fn validate_rejects_relative_and_non_http_urls() {
        let relative = DeskConfig::builder().base_url("/api").build();
        assert!(matches!(
            relative.validate(),
            Err(DeskError::Configuration(_))
        ));
        let ftp = DeskConfig::builder().base_url("ftp://files.example.com").build();
        assert!(matches!(ftp.validate(), Err(DeskError::Configuration(_))));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let config = DeskConfig::builder()
            .base_url("http://localhost")
            .request_timeout(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());
    }
}
