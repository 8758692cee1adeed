//! Yahoo Finance API client

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use tracing::debug;
use yahoo_finance_api as yahoo;

use super::PriceSource;
use crate::error::{MarketError, Result};

/// One daily (or latest) price bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

impl PriceBar {
    fn from_yahoo(q: &yahoo::Quote) -> Self {
        Self {
            timestamp: i64::try_from(q.timestamp)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or_default(),
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            adj_close: q.adjclose,
            volume: q.volume,
        }
    }
}

/// History window accepted by [`PriceSource::history`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl HistoryRange {
    pub const ALL: [Self; 11] = [
        Self::OneDay,
        Self::FiveDays,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
        Self::TwoYears,
        Self::FiveYears,
        Self::TenYears,
        Self::YearToDate,
        Self::Max,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }

    /// Start of the window ending at `end`
    pub fn start(self, end: DateTime<Utc>) -> DateTime<Utc> {
        let days = match self {
            Self::OneDay => 1,
            Self::FiveDays => 5,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::OneYear => 365,
            Self::TwoYears => 730,
            Self::FiveYears => 1825,
            Self::TenYears => 3650,
            Self::Max => 36500,
            Self::YearToDate => {
                return NaiveDate::from_ymd_opt(end.year(), 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map_or(end - Duration::days(365), |d| d.and_utc());
            }
        };
        end - Duration::days(days)
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRange {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MarketError::ConfigError(format!("invalid history range: {s}")))
    }
}

/// Yahoo Finance API client
pub struct YahooFinanceClient {
    connector: yahoo::YahooConnector,
}

impl YahooFinanceClient {
    pub fn new() -> Result<Self> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| MarketError::YahooFinanceError(e.to_string()))?;
        Ok(Self { connector })
    }

    /// Latest quote for a symbol
    pub async fn get_quote(&self, symbol: &str) -> Result<PriceBar> {
        let response = self
            .connector
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| classify_error(symbol, &e.to_string()))?;

        let quote = response
            .last_quote()
            .map_err(|e| classify_error(symbol, &e.to_string()))?;

        Ok(PriceBar::from_yahoo(&quote))
    }

    /// Daily bars between two instants
    pub async fn get_historical_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>> {
        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| MarketError::ConfigError(format!("invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| MarketError::ConfigError(format!("invalid end timestamp: {e}")))?;

        let response = self
            .connector
            .get_quote_history(symbol, start_odt, end_odt)
            .await
            .map_err(|e| classify_error(symbol, &e.to_string()))?;

        let quotes = response
            .quotes()
            .map_err(|e| classify_error(symbol, &e.to_string()))?;

        debug!(symbol, bars = quotes.len(), "Fetched price history");

        if quotes.is_empty() {
            return Err(MarketError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no price history returned".to_string(),
            });
        }

        Ok(quotes.iter().map(PriceBar::from_yahoo).collect())
    }

    /// Daily bars for a named range ending now
    pub async fn get_historical_range(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<PriceBar>> {
        let end = Utc::now();
        self.get_historical_quotes(symbol, range.start(end), end)
            .await
    }
}

#[async_trait]
impl PriceSource for YahooFinanceClient {
    async fn latest_quote(&self, symbol: &str) -> Result<PriceBar> {
        self.get_quote(symbol).await
    }

    async fn history(&self, symbol: &str, range: HistoryRange) -> Result<Vec<PriceBar>> {
        self.get_historical_range(symbol, range).await
    }

    async fn validate_symbol(&self, symbol: &str) -> Result<()> {
        let quote = self.get_quote(symbol).await?;
        if quote.close.is_finite() && quote.close > 0.0 {
            Ok(())
        } else {
            Err(MarketError::InvalidSymbol(format!(
                "{symbol} has no trading price"
            )))
        }
    }
}

/// Separate "symbol does not exist" from transient provider failures
fn classify_error(symbol: &str, message: &str) -> MarketError {
    let lower = message.to_ascii_lowercase();
    let unknown = ["not found", "no data", "no quotes", "no result", "delisted", "empty"]
        .iter()
        .any(|needle| lower.contains(needle));

    if unknown {
        MarketError::InvalidSymbol(format!("{symbol}: {message}"))
    } else {
        MarketError::YahooFinanceError(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_utils::Retryable;
    use chrono::TimeZone;

    #[test]
    fn test_history_range_parse() {
        assert_eq!("1y".parse::<HistoryRange>().unwrap(), HistoryRange::OneYear);
        assert_eq!("YTD".parse::<HistoryRange>().unwrap(), HistoryRange::YearToDate);
        assert!("2w".parse::<HistoryRange>().is_err());

        for range in HistoryRange::ALL {
            assert_eq!(range.as_str().parse::<HistoryRange>().unwrap(), range);
        }
    }

    #[test]
    fn test_history_range_start() {
        let end = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(HistoryRange::FiveDays.start(end), end - Duration::days(5));
        assert_eq!(
            HistoryRange::YearToDate.start(end),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(HistoryRange::Max.start(end) < HistoryRange::TenYears.start(end));
    }

    #[test]
    fn test_classify_error() {
        let err = classify_error("ZZZZ", "fetching the data from yahoo! finance failed: Not Found");
        assert!(matches!(err, MarketError::InvalidSymbol(_)));
        assert!(!err.is_retryable());

        let err = classify_error("AAPL", "connection reset by peer");
        assert!(matches!(err, MarketError::YahooFinanceError(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_get_quote() {
        let client = YahooFinanceClient::new().unwrap();
        let quote = client.get_quote("AAPL").await.unwrap();
        assert!(quote.close > 0.0);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_get_historical_range() {
        let client = YahooFinanceClient::new().unwrap();
        let bars = client
            .get_historical_range("AAPL", HistoryRange::OneMonth)
            .await
            .unwrap();
        assert!(!bars.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_validate_symbol() {
        let client = YahooFinanceClient::new().unwrap();
        assert!(client.validate_symbol("AAPL").await.is_ok());
        assert!(client.validate_symbol("INVALIDSYMBOL123").await.is_err());
    }
}
