//! Alpha Vantage API client
//!
//! Supplies the fundamentals Yahoo's chart API lacks: company overview,
//! balance sheet and annual earnings. The free tier allows 5 requests per
//! minute, enforced locally with a `governor` limiter so that throttling
//! shows up as waiting rather than as "Note" payloads.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::FundamentalsSource;
use crate::error::{MarketError, Result};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Company overview (`function=OVERVIEW`)
///
/// Ratios are fractions (0.25 = 25%) as Alpha Vantage reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyOverview {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
    pub eps: Option<f64>,
    pub profit_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub revenue_ttm: Option<f64>,
    pub gross_profit_ttm: Option<f64>,
    pub quarterly_revenue_growth: Option<f64>,
    pub quarterly_earnings_growth: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub beta: Option<f64>,
}

impl CompanyOverview {
    pub fn from_json(symbol: &str, data: &Value) -> Result<Self> {
        check_payload(symbol, data)?;

        if data.get("Symbol").is_none() {
            return Err(MarketError::InvalidSymbol(format!(
                "{symbol}: no company overview"
            )));
        }

        Ok(Self {
            symbol: text(data, "Symbol").unwrap_or_else(|| symbol.to_string()),
            name: text(data, "Name"),
            exchange: text(data, "Exchange"),
            sector: text(data, "Sector"),
            industry: text(data, "Industry"),
            market_cap: number(data, "MarketCapitalization"),
            pe_ratio: number(data, "PERatio"),
            forward_pe: number(data, "ForwardPE"),
            price_to_book: number(data, "PriceToBookRatio"),
            price_to_sales: number(data, "PriceToSalesRatioTTM"),
            ev_to_ebitda: number(data, "EVToEBITDA"),
            eps: number(data, "EPS"),
            profit_margin: number(data, "ProfitMargin"),
            operating_margin: number(data, "OperatingMarginTTM"),
            return_on_assets: number(data, "ReturnOnAssetsTTM"),
            return_on_equity: number(data, "ReturnOnEquityTTM"),
            revenue_ttm: number(data, "RevenueTTM"),
            gross_profit_ttm: number(data, "GrossProfitTTM"),
            quarterly_revenue_growth: number(data, "QuarterlyRevenueGrowthYOY"),
            quarterly_earnings_growth: number(data, "QuarterlyEarningsGrowthYOY"),
            dividend_yield: number(data, "DividendYield"),
            week_52_high: number(data, "52WeekHigh"),
            week_52_low: number(data, "52WeekLow"),
            beta: number(data, "Beta"),
        })
    }
}

/// Most recent balance sheet (`function=BALANCE_SHEET`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub fiscal_date_ending: Option<String>,
    pub total_current_assets: Option<f64>,
    pub total_current_liabilities: Option<f64>,
    pub inventory: Option<f64>,
    pub total_shareholder_equity: Option<f64>,
    pub total_debt: Option<f64>,
    pub cash: Option<f64>,
}

impl BalanceSheet {
    /// Latest quarterly report, falling back to the latest annual one
    pub fn from_json(symbol: &str, data: &Value) -> Result<Self> {
        check_payload(symbol, data)?;

        let report = ["quarterlyReports", "annualReports"]
            .iter()
            .find_map(|key| data.get(*key)?.as_array()?.first())
            .ok_or_else(|| MarketError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no balance sheet reports".to_string(),
            })?;

        Ok(Self {
            fiscal_date_ending: text(report, "fiscalDateEnding"),
            total_current_assets: number(report, "totalCurrentAssets"),
            total_current_liabilities: number(report, "totalCurrentLiabilities"),
            inventory: number(report, "inventory"),
            total_shareholder_equity: number(report, "totalShareholderEquity"),
            total_debt: number(report, "shortLongTermDebtTotal").or_else(|| {
                match (
                    number(report, "shortTermDebt"),
                    number(report, "longTermDebt"),
                ) {
                    (None, None) => None,
                    (short, long) => Some(short.unwrap_or(0.0) + long.unwrap_or(0.0)),
                }
            }),
            cash: number(report, "cashAndCashEquivalentsAtCarryingValue")
                .or_else(|| number(report, "cashAndShortTermInvestments")),
        })
    }
}

/// Annual reported EPS, newest first (`function=EARNINGS`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsHistory {
    pub annual_eps: Vec<(String, f64)>,
}

impl EarningsHistory {
    pub fn from_json(symbol: &str, data: &Value) -> Result<Self> {
        check_payload(symbol, data)?;

        let annual_eps = data
            .get("annualEarnings")
            .and_then(Value::as_array)
            .map(|reports| {
                reports
                    .iter()
                    .filter_map(|r| Some((text(r, "fiscalDateEnding")?, number(r, "reportedEPS")?)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { annual_eps })
    }

    /// EPS of the last two fiscal years as (previous, latest)
    pub fn last_two_years(&self) -> Option<(f64, f64)> {
        match self.annual_eps.as_slice() {
            [(_, latest), (_, previous), ..] => Some((*previous, *latest)),
            _ => None,
        }
    }
}

/// Alpha Vantage API client
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    rate_limiter: SharedRateLimiter,
}

impl AlphaVantageClient {
    /// Create a client allowing `rate_limit` requests per minute
    pub fn new(api_key: impl Into<String>, rate_limit: u32, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<Value> {
        self.rate_limiter.until_ready().await;
        debug!(function, symbol, "Alpha Vantage request");

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", function),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::HttpStatus {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
            });
        }

        // Outages answer 200 with an HTML page
        let body = response.text().await?;
        parse_body(&body)
    }

    pub async fn get_overview(&self, symbol: &str) -> Result<CompanyOverview> {
        let data = self.query("OVERVIEW", symbol).await?;
        CompanyOverview::from_json(symbol, &data)
    }

    pub async fn get_balance_sheet(&self, symbol: &str) -> Result<BalanceSheet> {
        let data = self.query("BALANCE_SHEET", symbol).await?;
        BalanceSheet::from_json(symbol, &data)
    }

    pub async fn get_earnings(&self, symbol: &str) -> Result<EarningsHistory> {
        let data = self.query("EARNINGS", symbol).await?;
        EarningsHistory::from_json(symbol, &data)
    }
}

#[async_trait]
impl FundamentalsSource for AlphaVantageClient {
    async fn overview(&self, symbol: &str) -> Result<CompanyOverview> {
        self.get_overview(symbol).await
    }

    async fn balance_sheet(&self, symbol: &str) -> Result<BalanceSheet> {
        self.get_balance_sheet(symbol).await
    }

    async fn earnings(&self, symbol: &str) -> Result<EarningsHistory> {
        self.get_earnings(symbol).await
    }
}

fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| MarketError::Parse {
        provider: PROVIDER.to_string(),
        reason: e.to_string(),
    })
}

/// Map Alpha Vantage's in-band error payloads to errors
fn check_payload(symbol: &str, data: &Value) -> Result<()> {
    if let Some(message) = data.get("Error Message").and_then(Value::as_str) {
        return Err(MarketError::InvalidSymbol(format!("{symbol}: {message}")));
    }

    for key in ["Note", "Information"] {
        if let Some(message) = data.get(key).and_then(Value::as_str) {
            if message.to_ascii_lowercase().contains("apikey") {
                return Err(MarketError::ConfigError(format!(
                    "{PROVIDER} rejected the API key: {message}"
                )));
            }
            return Err(MarketError::RateLimitExceeded {
                provider: PROVIDER.to_string(),
            });
        }
    }

    if data.as_object().is_some_and(serde_json::Map::is_empty) {
        return Err(MarketError::InvalidSymbol(format!(
            "{symbol}: no data from {PROVIDER}"
        )));
    }

    Ok(())
}

fn text(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "None" && *s != "-")
        .map(str::to_string)
}

/// Alpha Vantage sends numbers as strings and "None" for missing values
fn number(data: &Value, key: &str) -> Option<f64> {
    match data.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_utils::Retryable;
    use serde_json::json;

    #[test]
    fn test_overview_parsing() {
        let data = json!({
            "Symbol": "IBM",
            "Name": "International Business Machines",
            "Sector": "TECHNOLOGY",
            "MarketCapitalization": "172000000000",
            "PERatio": "22.5",
            "ForwardPE": "None",
            "ProfitMargin": "0.0968",
            "GrossProfitTTM": "32688000000",
            "RevenueTTM": "61860000000",
            "52WeekHigh": "199.18",
            "DividendYield": "0.0356",
            "Industry": "-"
        });

        let overview = CompanyOverview::from_json("IBM", &data).unwrap();
        assert_eq!(overview.name.as_deref(), Some("International Business Machines"));
        assert_eq!(overview.market_cap, Some(172_000_000_000.0));
        assert_eq!(overview.pe_ratio, Some(22.5));
        assert_eq!(overview.forward_pe, None);
        assert_eq!(overview.industry, None);
        assert_eq!(overview.week_52_high, Some(199.18));
    }

    #[test]
    fn test_payload_errors() {
        let err = CompanyOverview::from_json(
            "IBM",
            &json!({"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"}),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::RateLimitExceeded { .. }));
        assert!(err.is_retryable());

        let err = CompanyOverview::from_json(
            "IBM",
            &json!({"Information": "The **demo** API key is for demo purposes only. Please claim your free apikey"}),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::ConfigError(_)));

        let err = CompanyOverview::from_json("ZZZZ", &json!({})).unwrap_err();
        assert!(matches!(err, MarketError::InvalidSymbol(_)));
        assert!(!err.is_retryable());

        let err = BalanceSheet::from_json(
            "ZZZZ",
            &json!({"Error Message": "Invalid API call."}),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::InvalidSymbol(_)));
    }

    #[test]
    fn test_non_json_body_is_not_retried() {
        let err = parse_body("<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, MarketError::Parse { ref provider, .. } if provider == PROVIDER));
        assert!(!err.is_retryable());

        let data = parse_body(r#"{"Symbol": "IBM"}"#).unwrap();
        assert_eq!(data["Symbol"], "IBM");
    }

    #[test]
    fn test_balance_sheet_prefers_quarterly() {
        let data = json!({
            "symbol": "IBM",
            "annualReports": [{"fiscalDateEnding": "2023-12-31", "totalCurrentAssets": "1"}],
            "quarterlyReports": [{
                "fiscalDateEnding": "2024-03-31",
                "totalCurrentAssets": "32000",
                "totalCurrentLiabilities": "31000",
                "inventory": "1200",
                "totalShareholderEquity": "23000",
                "shortTermDebt": "6000",
                "longTermDebt": "50000",
                "cashAndCashEquivalentsAtCarryingValue": "11000"
            }]
        });

        let sheet = BalanceSheet::from_json("IBM", &data).unwrap();
        assert_eq!(sheet.fiscal_date_ending.as_deref(), Some("2024-03-31"));
        assert_eq!(sheet.total_current_assets, Some(32000.0));
        assert_eq!(sheet.total_debt, Some(56000.0));
        assert_eq!(sheet.cash, Some(11000.0));
    }

    #[test]
    fn test_balance_sheet_without_reports() {
        let err = BalanceSheet::from_json("IBM", &json!({"symbol": "IBM"})).unwrap_err();
        assert!(matches!(err, MarketError::DataUnavailable { .. }));
    }

    #[test]
    fn test_earnings_history() {
        let data = json!({
            "symbol": "IBM",
            "annualEarnings": [
                {"fiscalDateEnding": "2023-12-31", "reportedEPS": "9.61"},
                {"fiscalDateEnding": "2022-12-31", "reportedEPS": "9.13"},
                {"fiscalDateEnding": "2021-12-31", "reportedEPS": "None"}
            ]
        });

        let earnings = EarningsHistory::from_json("IBM", &data).unwrap();
        assert_eq!(earnings.annual_eps.len(), 2);
        assert_eq!(earnings.last_two_years(), Some((9.13, 9.61)));
    }

    #[tokio::test]
    #[ignore] // Requires network access and ALPHA_VANTAGE_API_KEY
    async fn test_get_overview() {
        let key = std::env::var("ALPHA_VANTAGE_API_KEY").unwrap();
        let client = AlphaVantageClient::new(key, 5, Duration::from_secs(30)).unwrap();
        let overview = client.get_overview("IBM").await.unwrap();
        assert_eq!(overview.symbol, "IBM");
    }
}
