//! Tool for fetching a stock snapshot: quote, one-year history, technicals

use agent_core::Result as AgentResult;
use agent_llm::tools::schema;
use agent_tools::Tool;
use agent_utils::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::{cached, cached_overview, parse_params, retried};
use crate::api::{CompanyOverview, FundamentalsSource, HistoryRange, PriceBar, PriceSource};
use crate::cache::{CacheKey, MarketCache};
use crate::error::{MarketError, Result};
use crate::indicators::TechnicalSummary;
use crate::ratios::HistorySummary;
use crate::ticker::Ticker;

/// Daily close and volume series, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub dates: Vec<String>,
    pub closes: Vec<f64>,
    pub volumes: Vec<u64>,
}

impl PriceSeries {
    fn from_bars(bars: &[PriceBar]) -> Self {
        Self {
            dates: bars
                .iter()
                .map(|b| b.timestamp.format("%Y-%m-%d").to_string())
                .collect(),
            closes: bars.iter().map(|b| b.close).collect(),
            volumes: bars.iter().map(|b| b.volume).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

/// Everything `stock_data` knows about a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub symbol: String,
    pub name: Option<String>,
    pub as_of: DateTime<Utc>,
    pub current_price: f64,
    pub volume: u64,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub last_month_low: Option<f64>,
    pub last_month_high: Option<f64>,
    pub last_month_avg_volume: Option<f64>,
    pub one_year_change_pct: Option<f64>,
    pub technicals: TechnicalSummary,
    pub history: PriceSeries,
    /// Data that could not be fetched, for the reader of the snapshot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl StockSnapshot {
    /// Combine a quote, a daily history and an optional overview
    pub fn assemble(
        symbol: &Ticker,
        quote: &PriceBar,
        history: &[PriceBar],
        overview: Option<&CompanyOverview>,
    ) -> Result<Self> {
        let closes: Vec<f64> = history.iter().map(|b| b.close).collect();
        let technicals = TechnicalSummary::from_closes(&closes)?;
        let summary = HistorySummary::from_bars(history);

        Ok(Self {
            symbol: symbol.to_string(),
            name: overview.and_then(|o| o.name.clone()),
            as_of: quote.timestamp,
            current_price: quote.close,
            volume: quote.volume,
            market_cap: overview.and_then(|o| o.market_cap),
            pe_ratio: overview.and_then(|o| o.pe_ratio),
            dividend_yield: overview.and_then(|o| o.dividend_yield),
            week_52_high: overview
                .and_then(|o| o.week_52_high)
                .or(summary.as_ref().map(|s| s.week_52_high)),
            week_52_low: overview
                .and_then(|o| o.week_52_low)
                .or(summary.as_ref().map(|s| s.week_52_low)),
            last_month_low: summary.as_ref().map(|s| s.last_month_low),
            last_month_high: summary.as_ref().map(|s| s.last_month_high),
            last_month_avg_volume: summary.as_ref().map(|s| s.last_month_avg_volume),
            one_year_change_pct: summary.as_ref().and_then(|s| s.period_change_pct),
            technicals,
            history: PriceSeries::from_bars(history),
            notes: Vec::new(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct StockDataParams {
    #[serde(alias = "symbol")]
    ticker: String,
    #[serde(default)]
    include_history: bool,
}

/// Tool returning a [`StockSnapshot`]
pub struct StockDataTool {
    prices: Arc<dyn PriceSource>,
    fundamentals: Option<Arc<dyn FundamentalsSource>>,
    realtime: MarketCache,
    fundamental: MarketCache,
    retry: RetryPolicy,
}

impl StockDataTool {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        fundamentals: Option<Arc<dyn FundamentalsSource>>,
        realtime: MarketCache,
        fundamental: MarketCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            prices,
            fundamentals,
            realtime,
            fundamental,
            retry,
        }
    }

    /// Snapshot for `ticker`, served from the realtime cache when fresh
    pub async fn snapshot(&self, ticker: &Ticker) -> Result<StockSnapshot> {
        let key = CacheKey::new(ticker.as_str(), "stock_data", json!({ "range": "1y" }));
        cached(&self.realtime, key, || self.fetch_snapshot(ticker)).await
    }

    /// Check that the price provider knows `ticker`
    pub async fn validate(&self, ticker: &Ticker) -> Result<()> {
        retried(&self.retry, "yahoo.validate", || {
            self.prices.validate_symbol(ticker.as_str())
        })
        .await
    }

    async fn fetch_snapshot(&self, ticker: &Ticker) -> Result<StockSnapshot> {
        let symbol = ticker.as_str();
        let (quote, history, overview) = futures::join!(
            retried(&self.retry, "yahoo.quote", || self.prices.latest_quote(symbol)),
            retried(&self.retry, "yahoo.history", || {
                self.prices.history(symbol, HistoryRange::OneYear)
            }),
            self.overview(ticker),
        );
        let (quote, history) = (quote?, history?);

        let mut notes = Vec::new();
        let overview = match overview {
            Some(Ok(overview)) => Some(overview),
            Some(Err(e)) => {
                warn!(symbol, error = %e, "Company overview unavailable");
                notes.push(format!("company overview unavailable: {e}"));
                None
            }
            None => {
                notes.push(
                    "market cap, P/E and dividend yield need ALPHA_VANTAGE_API_KEY".to_string(),
                );
                None
            }
        };

        let mut snapshot = StockSnapshot::assemble(ticker, &quote, &history, overview.as_ref())?;
        snapshot.notes = notes;
        info!(
            symbol,
            price = snapshot.current_price,
            bars = snapshot.history.len(),
            "Fetched stock snapshot"
        );
        Ok(snapshot)
    }

    /// Overview through the fundamental cache; `None` without a provider
    async fn overview(&self, ticker: &Ticker) -> Option<Result<CompanyOverview>> {
        let fundamentals = self.fundamentals.as_deref()?;
        Some(cached_overview(fundamentals, &self.fundamental, &self.retry, ticker).await)
    }
}

#[async_trait]
impl Tool for StockDataTool {
    async fn execute(&self, params: Value) -> AgentResult<Value> {
        let params: StockDataParams = parse_params(params)?;
        let ticker = Ticker::parse(&params.ticker)?;

        let snapshot = self.snapshot(&ticker).await?;
        let mut value = serde_json::to_value(snapshot).map_err(MarketError::from)?;
        if !params.include_history {
            if let Some(obj) = value.as_object_mut() {
                obj.remove("history");
            }
        }
        Ok(value)
    }

    fn name(&self) -> &str {
        "stock_data"
    }

    fn description(&self) -> &str {
        "Get current stock data and basic financials for a ticker: latest price and volume, \
         market cap, P/E, dividend yield, 52-week and last-month ranges, one-year change, \
         and a technical summary (RSI-14, MACD 12/26/9, SMA-50, SMA-200). \
         Set include_history to also receive the one-year daily close and volume series."
    }

    fn input_schema(&self) -> Value {
        schema::object(
            json!({
                "ticker": schema::ticker(),
                "include_history": schema::boolean(
                    "Include the one-year daily close/volume series (large)"
                ),
            }),
            &["ticker"],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockFundamentalsSource, MockPriceSource};
    use crate::tools::fixtures::{bars, healthy_prices};
    use std::time::Duration as StdDuration;

    fn tool(prices: MockPriceSource, fundamentals: Option<MockFundamentalsSource>) -> StockDataTool {
        StockDataTool::new(
            Arc::new(prices),
            fundamentals.map(|f| Arc::new(f) as Arc<dyn FundamentalsSource>),
            MarketCache::new(StdDuration::from_secs(60)),
            MarketCache::new(StdDuration::from_secs(60)),
            RetryPolicy::fast(),
        )
    }

    #[test]
    fn test_tool_metadata() {
        let tool = tool(MockPriceSource::new(), None);
        assert_eq!(tool.name(), "stock_data");
        let schema = tool.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"][0], "ticker");
    }

    #[tokio::test]
    async fn test_snapshot_without_fundamentals() {
        let tool = tool(healthy_prices(1), None);
        let value = tool.execute(json!({"ticker": "aapl"})).await.unwrap();

        assert_eq!(value["symbol"], "AAPL");
        assert_eq!(value["current_price"], 359.0);
        assert!(value["market_cap"].is_null());
        assert!(value.get("history").is_none());
        assert!(value["technicals"]["sma_200"].is_number());
        assert!(value["notes"][0].as_str().unwrap().contains("ALPHA_VANTAGE_API_KEY"));
    }

    #[tokio::test]
    async fn test_snapshot_is_cached() {
        let tool = tool(healthy_prices(1), None);
        let ticker = Ticker::parse("MSFT").unwrap();

        let first = tool.snapshot(&ticker).await.unwrap();
        let second = tool.snapshot(&ticker).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.history.len(), 260);

        let with_history = tool
            .execute(json!({"symbol": "MSFT", "include_history": true}))
            .await
            .unwrap();
        assert_eq!(with_history["history"]["closes"].as_array().unwrap().len(), 260);
    }

    #[tokio::test]
    async fn test_snapshot_with_overview() {
        let mut fundamentals = MockFundamentalsSource::new();
        fundamentals.expect_overview().times(1).returning(|symbol| {
            Ok(CompanyOverview {
                symbol: symbol.to_string(),
                name: Some("Acme Corp".into()),
                market_cap: Some(2.5e12),
                pe_ratio: Some(31.2),
                dividend_yield: Some(0.005),
                ..CompanyOverview::default()
            })
        });

        let tool = tool(healthy_prices(1), Some(fundamentals));
        let snapshot = tool.snapshot(&Ticker::parse("ACME").unwrap()).await.unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("Acme Corp"));
        assert_eq!(snapshot.pe_ratio, Some(31.2));
        assert!(snapshot.notes.is_empty());
    }

    #[tokio::test]
    async fn test_overview_failure_is_not_fatal() {
        let mut fundamentals = MockFundamentalsSource::new();
        fundamentals
            .expect_overview()
            .returning(|_| Err(MarketError::ConfigError("bad key".into())));

        let tool = tool(healthy_prices(1), Some(fundamentals));
        let snapshot = tool.snapshot(&Ticker::parse("ACME").unwrap()).await.unwrap();
        assert!(snapshot.market_cap.is_none());
        assert!(snapshot.notes[0].contains("bad key"));
    }

    #[tokio::test]
    async fn test_quote_failure_is_retried_then_reported() {
        let mut prices = MockPriceSource::new();
        prices
            .expect_latest_quote()
            .times(3)
            .returning(|_| Err(MarketError::YahooFinanceError("503 Service Unavailable".into())));
        prices.expect_history().returning(|_, _| Ok(bars(30)));

        let tool = tool(prices, None);
        let err = tool.execute(json!({"ticker": "AAPL"})).await.unwrap_err();
        match err {
            agent_core::Error::ExternalCall {
                service, attempts, ..
            } => {
                assert_eq!(service, "yahoo.quote");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validate_does_not_retry_unknown_symbols() {
        let mut prices = MockPriceSource::new();
        prices
            .expect_validate_symbol()
            .times(1)
            .returning(|s| Err(MarketError::InvalidSymbol(s.to_string())));

        let err = tool(prices, None)
            .validate(&Ticker::parse("ZZZZ").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidSymbol(ref s) if s == "ZZZZ"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_ticker() {
        let tool = tool(MockPriceSource::new(), None);
        assert!(tool.execute(json!({"ticker": "not a ticker"})).await.is_err());
        assert!(tool.execute(json!({})).await.is_err());
    }
}
