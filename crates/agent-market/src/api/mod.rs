//! API clients for market data and web search
//!
//! Tools depend on the traits below rather than on the concrete clients so
//! the crew can be exercised with mocks.

pub mod alpha_vantage;
pub mod duckduckgo;
pub mod yahoo;

pub use alpha_vantage::{AlphaVantageClient, BalanceSheet, CompanyOverview, EarningsHistory};
pub use duckduckgo::{DuckDuckGoClient, SearchResult};
pub use yahoo::{HistoryRange, PriceBar, YahooFinanceClient};

use crate::error::Result;
use async_trait::async_trait;

/// Quotes and daily price history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn latest_quote(&self, symbol: &str) -> Result<PriceBar>;

    async fn history(&self, symbol: &str, range: HistoryRange) -> Result<Vec<PriceBar>>;

    /// Fails with [`crate::MarketError::InvalidSymbol`] for unknown tickers
    async fn validate_symbol(&self, symbol: &str) -> Result<()>;
}

/// Company fundamentals
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundamentalsSource: Send + Sync {
    async fn overview(&self, symbol: &str) -> Result<CompanyOverview>;

    async fn balance_sheet(&self, symbol: &str) -> Result<BalanceSheet>;

    async fn earnings(&self, symbol: &str) -> Result<EarningsHistory>;
}

/// Free-text web search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;
}
