//! Configuration for market data and the analysis crew

use crate::error::{MarketError, Result};
use agent_utils::RetryPolicy;
use std::time::Duration;

/// Environment variable holding the Alpha Vantage key
pub const ALPHA_VANTAGE_KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";

/// Configuration for market data access and crew behaviour
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Cache TTL for quotes and price history
    pub cache_ttl_realtime: Duration,

    /// Cache TTL for company fundamentals
    pub cache_ttl_fundamental: Duration,

    /// Cache TTL for web search results
    pub cache_ttl_search: Duration,

    /// Alpha Vantage API key; fundamentals are unavailable without it
    pub alpha_vantage_api_key: Option<String>,

    /// Alpha Vantage requests per minute (free tier: 5)
    pub alpha_vantage_rate_limit: u32,

    /// Web search requests per minute
    pub search_rate_limit: u32,

    /// Upper bound on results returned by `web_search`
    pub max_search_results: usize,

    /// HTTP timeout for data providers
    pub request_timeout: Duration,

    /// Check the ticker against Yahoo before starting the agents
    pub validate_ticker: bool,

    /// Fetch a market snapshot for display alongside the report
    pub fetch_snapshot: bool,

    /// Retry policy for data provider calls
    pub retry: RetryPolicy,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            cache_ttl_realtime: Duration::from_secs(60),
            cache_ttl_fundamental: Duration::from_secs(3600),
            cache_ttl_search: Duration::from_secs(300),
            alpha_vantage_api_key: None,
            alpha_vantage_rate_limit: 5,
            search_rate_limit: 30,
            max_search_results: 5,
            request_timeout: Duration::from_secs(30),
            validate_ticker: true,
            fetch_snapshot: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl MarketConfig {
    /// Create a new configuration builder
    pub fn builder() -> MarketConfigBuilder {
        MarketConfigBuilder::default()
    }

    /// Load the Alpha Vantage API key from the environment
    pub fn with_env_api_key(self) -> Self {
        self.with_api_key_from(|key| std::env::var(key).ok())
    }

    /// Load the Alpha Vantage API key through `lookup`
    pub fn with_api_key_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ALPHA_VANTAGE_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.alpha_vantage_api_key = Some(key.trim().to_string());
        }
        self
    }

    /// Whether fundamentals can be fetched
    pub fn has_fundamentals(&self) -> bool {
        self.alpha_vantage_api_key.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.alpha_vantage_rate_limit == 0 {
            return Err(MarketError::ConfigError(
                "alpha_vantage_rate_limit must be greater than 0".to_string(),
            ));
        }

        if self.search_rate_limit == 0 {
            return Err(MarketError::ConfigError(
                "search_rate_limit must be greater than 0".to_string(),
            ));
        }

        if self.max_search_results == 0 {
            return Err(MarketError::ConfigError(
                "max_search_results must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(MarketError::ConfigError(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        self.retry.validate().map_err(MarketError::ConfigError)
    }
}

/// Builder for MarketConfig
#[derive(Debug, Default)]
pub struct MarketConfigBuilder {
    cache_ttl_realtime: Option<Duration>,
    cache_ttl_fundamental: Option<Duration>,
    cache_ttl_search: Option<Duration>,
    alpha_vantage_api_key: Option<String>,
    alpha_vantage_rate_limit: Option<u32>,
    search_rate_limit: Option<u32>,
    max_search_results: Option<usize>,
    request_timeout: Option<Duration>,
    validate_ticker: Option<bool>,
    fetch_snapshot: Option<bool>,
    retry: Option<RetryPolicy>,
}

impl MarketConfigBuilder {
    pub fn cache_ttl_realtime(mut self, duration: Duration) -> Self {
        self.cache_ttl_realtime = Some(duration);
        self
    }

    pub fn cache_ttl_fundamental(mut self, duration: Duration) -> Self {
        self.cache_ttl_fundamental = Some(duration);
        self
    }

    pub fn cache_ttl_search(mut self, duration: Duration) -> Self {
        self.cache_ttl_search = Some(duration);
        self
    }

    pub fn alpha_vantage_api_key(mut self, key: impl Into<String>) -> Self {
        self.alpha_vantage_api_key = Some(key.into());
        self
    }

    pub fn alpha_vantage_rate_limit(mut self, per_minute: u32) -> Self {
        self.alpha_vantage_rate_limit = Some(per_minute);
        self
    }

    pub fn search_rate_limit(mut self, per_minute: u32) -> Self {
        self.search_rate_limit = Some(per_minute);
        self
    }

    pub fn max_search_results(mut self, max: usize) -> Self {
        self.max_search_results = Some(max);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Toggle the pre-flight ticker check
    pub fn validate_ticker(mut self, validate: bool) -> Self {
        self.validate_ticker = Some(validate);
        self
    }

    /// Toggle the display snapshot
    pub fn fetch_snapshot(mut self, fetch: bool) -> Self {
        self.fetch_snapshot = Some(fetch);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<MarketConfig> {
        let defaults = MarketConfig::default();
        let config = MarketConfig {
            cache_ttl_realtime: self.cache_ttl_realtime.unwrap_or(defaults.cache_ttl_realtime),
            cache_ttl_fundamental: self
                .cache_ttl_fundamental
                .unwrap_or(defaults.cache_ttl_fundamental),
            cache_ttl_search: self.cache_ttl_search.unwrap_or(defaults.cache_ttl_search),
            alpha_vantage_api_key: self.alpha_vantage_api_key,
            alpha_vantage_rate_limit: self
                .alpha_vantage_rate_limit
                .unwrap_or(defaults.alpha_vantage_rate_limit),
            search_rate_limit: self.search_rate_limit.unwrap_or(defaults.search_rate_limit),
            max_search_results: self.max_search_results.unwrap_or(defaults.max_search_results),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            validate_ticker: self.validate_ticker.unwrap_or(defaults.validate_ticker),
            fetch_snapshot: self.fetch_snapshot.unwrap_or(defaults.fetch_snapshot),
            retry: self.retry.unwrap_or(defaults.retry),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MarketConfig::default();
        assert_eq!(config.cache_ttl_realtime, Duration::from_secs(60));
        assert_eq!(config.alpha_vantage_rate_limit, 5);
        assert!(config.validate_ticker);
        assert!(!config.has_fundamentals());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = MarketConfig::builder()
            .cache_ttl_realtime(Duration::from_secs(10))
            .alpha_vantage_api_key("demo")
            .validate_ticker(false)
            .max_search_results(3)
            .build()
            .unwrap();

        assert_eq!(config.cache_ttl_realtime, Duration::from_secs(10));
        assert_eq!(config.cache_ttl_fundamental, Duration::from_secs(3600));
        assert!(config.has_fundamentals());
        assert!(!config.validate_ticker);
        assert_eq!(config.max_search_results, 3);
    }

    #[test]
    fn test_validation() {
        assert!(
            MarketConfig::builder()
                .alpha_vantage_rate_limit(0)
                .build()
                .is_err()
        );
        assert!(MarketConfig::builder().max_search_results(0).build().is_err());

        let err = MarketConfig::builder()
            .retry(RetryPolicy::default().with_max_attempts(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, MarketError::ConfigError(_)));
    }

    #[test]
    fn test_api_key_lookup() {
        let config = MarketConfig::default().with_api_key_from(|key| {
            (key == ALPHA_VANTAGE_KEY_ENV).then(|| " abc123 ".to_string())
        });
        assert_eq!(config.alpha_vantage_api_key.as_deref(), Some("abc123"));

        let config = MarketConfig::default().with_api_key_from(|_| Some(String::new()));
        assert!(config.alpha_vantage_api_key.is_none());
    }
}
