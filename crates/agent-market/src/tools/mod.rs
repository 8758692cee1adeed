//! Tools the role agents can call
//!
//! | name                | input              | cache tier  |
//! |---------------------|--------------------|-------------|
//! | `stock_data`        | `{ticker}`         | realtime    |
//! | `financial_metrics` | `{ticker}`         | fundamental |
//! | `web_search`        | `{query, limit}`   | search      |

pub mod financial_metrics;
pub mod stock_data;
pub mod web_search;

#[cfg(test)]
pub(crate) mod fixtures;

pub use financial_metrics::{
    FinancialHealth, FinancialMetrics, FinancialMetricsTool, Growth, Profitability, Valuation,
};
pub use stock_data::{PriceSeries, StockDataTool, StockSnapshot};
pub use web_search::WebSearchTool;

use agent_tools::{Tool, ToolRegistry};
use agent_utils::RetryPolicy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::api::{
    AlphaVantageClient, CompanyOverview, DuckDuckGoClient, FundamentalsSource, PriceSource,
    SearchSource, YahooFinanceClient,
};
use crate::cache::{CacheKey, CacheManager, MarketCache};
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::ticker::Ticker;

/// Tools a role can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    StockData,
    FinancialMetrics,
    WebSearch,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::StockData => "stock_data",
            Self::FinancialMetrics => "financial_metrics",
            Self::WebSearch => "web_search",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One instance of every tool, sharing clients and caches
#[derive(Clone)]
pub struct MarketToolbox {
    pub stock_data: Arc<StockDataTool>,
    pub financial_metrics: Arc<FinancialMetricsTool>,
    pub web_search: Arc<WebSearchTool>,
}

impl MarketToolbox {
    /// Build the tools over the given data sources
    pub fn new(
        prices: Arc<dyn PriceSource>,
        fundamentals: Option<Arc<dyn FundamentalsSource>>,
        search: Arc<dyn SearchSource>,
        config: &MarketConfig,
    ) -> Self {
        let caches = CacheManager::from_config(config);
        let retry = config.retry.clone();

        Self {
            stock_data: Arc::new(StockDataTool::new(
                prices,
                fundamentals.clone(),
                caches.realtime.clone(),
                caches.fundamental.clone(),
                retry.clone(),
            )),
            financial_metrics: Arc::new(FinancialMetricsTool::new(
                fundamentals,
                caches.fundamental,
                retry.clone(),
            )),
            web_search: Arc::new(WebSearchTool::new(
                search,
                caches.search,
                retry,
                config.max_search_results,
            )),
        }
    }

    /// Build the tools over Yahoo, Alpha Vantage (when keyed) and DuckDuckGo
    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        let prices: Arc<dyn PriceSource> = Arc::new(YahooFinanceClient::new()?);
        let fundamentals = match &config.alpha_vantage_api_key {
            Some(key) => Some(Arc::new(AlphaVantageClient::new(
                key.clone(),
                config.alpha_vantage_rate_limit,
                config.request_timeout,
            )?) as Arc<dyn FundamentalsSource>),
            None => None,
        };
        let search: Arc<dyn SearchSource> = Arc::new(DuckDuckGoClient::new(
            config.search_rate_limit,
            config.request_timeout,
        )?);

        Ok(Self::new(prices, fundamentals, search, config))
    }

    pub fn tool(&self, kind: ToolKind) -> Arc<dyn Tool> {
        match kind {
            ToolKind::StockData => Arc::clone(&self.stock_data) as Arc<dyn Tool>,
            ToolKind::FinancialMetrics => Arc::clone(&self.financial_metrics) as Arc<dyn Tool>,
            ToolKind::WebSearch => Arc::clone(&self.web_search) as Arc<dyn Tool>,
        }
    }

    /// Registry holding exactly `kinds`
    pub fn registry_for(&self, kinds: &[ToolKind]) -> ToolRegistry {
        ToolRegistry::with_tools(kinds.iter().map(|&kind| self.tool(kind)))
    }
}

/// Deserialize tool arguments
pub(crate) fn parse_params<T: DeserializeOwned>(params: Value) -> agent_core::Result<T> {
    serde_json::from_value(params)
        .map_err(|e| agent_core::Error::ProcessingFailed(format!("Invalid parameters: {e}")))
}

/// Run a provider call under the retry policy
pub(crate) async fn retried<T, F, Fut>(retry: &RetryPolicy, operation: &str, call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry
        .execute(operation, call)
        .await
        .map_err(|e| MarketError::from_retry(operation, e))
}

/// Typed wrapper over [`MarketCache::get_or_fetch`]
pub(crate) async fn cached<T, F, Fut>(cache: &MarketCache, key: CacheKey, fetch: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let value = cache
        .get_or_fetch(key, || async { Ok::<_, MarketError>(serde_json::to_value(fetch().await?)?) })
        .await?;
    Ok(serde_json::from_value(value)?)
}

/// Company overview shared by `stock_data` and `financial_metrics`
pub(crate) async fn cached_overview(
    fundamentals: &dyn FundamentalsSource,
    cache: &MarketCache,
    retry: &RetryPolicy,
    ticker: &Ticker,
) -> Result<CompanyOverview> {
    let key = CacheKey::new(ticker.as_str(), "overview", json!({}));
    cached(cache, key, || {
        retried(retry, "alpha_vantage.overview", || {
            fundamentals.overview(ticker.as_str())
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockPriceSource, MockSearchSource};

    #[test]
    fn test_registry_for_binds_only_requested_tools() {
        let toolbox = MarketToolbox::new(
            Arc::new(MockPriceSource::new()),
            None,
            Arc::new(MockSearchSource::new()),
            &MarketConfig::default(),
        );

        let registry = toolbox.registry_for(&[ToolKind::WebSearch, ToolKind::StockData]);
        assert_eq!(registry.names(), vec!["stock_data", "web_search"]);

        let registry = toolbox.registry_for(&[ToolKind::StockData]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("financial_metrics").is_none());
    }

    #[test]
    fn test_tool_kind_names_match_tools() {
        let toolbox = MarketToolbox::new(
            Arc::new(MockPriceSource::new()),
            None,
            Arc::new(MockSearchSource::new()),
            &MarketConfig::default(),
        );
        for kind in [ToolKind::StockData, ToolKind::FinancialMetrics, ToolKind::WebSearch] {
            assert_eq!(toolbox.tool(kind).name(), kind.name());
        }
    }

    #[test]
    fn test_parse_params_error() {
        #[derive(serde::Deserialize)]
        struct Params {
            #[allow(dead_code)]
            ticker: String,
        }
        let err = parse_params::<Params>(json!({"symbol": 1})).err().unwrap();
        assert!(err.to_string().contains("Invalid parameters"));
    }
}
