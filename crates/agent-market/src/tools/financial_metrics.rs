//! Tool for detailed financial metrics and ratios

use agent_core::Result as AgentResult;
use agent_llm::tools::schema;
use agent_tools::Tool;
use agent_utils::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::{cached, cached_overview, parse_params, retried};
use crate::api::{BalanceSheet, CompanyOverview, EarningsHistory, FundamentalsSource};
use crate::cache::{CacheKey, MarketCache};
use crate::config::ALPHA_VANTAGE_KEY_ENV;
use crate::error::{MarketError, Result};
use crate::ratios;
use crate::ticker::Ticker;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profitability {
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub profit_margin: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Growth {
    /// Quarterly revenue, year over year
    pub revenue_growth: Option<f64>,
    /// Annual reported EPS, latest fiscal year over the previous one
    pub earnings_growth: Option<f64>,
    /// Quarterly earnings, year over year
    pub earnings_quarterly_growth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialHealth {
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    /// Total debt over shareholder equity, as a plain ratio
    pub debt_to_equity: Option<f64>,
    pub total_debt: Option<f64>,
    pub total_cash: Option<f64>,
}

/// Output of `financial_metrics`; ratios are fractions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub symbol: String,
    pub fiscal_date_ending: Option<String>,
    pub profitability: Profitability,
    pub valuation: Valuation,
    pub growth: Growth,
    pub financial_health: FinancialHealth,
}

impl FinancialMetrics {
    /// Published ratios from the overview, the rest from the balance sheet
    pub fn compute(
        overview: &CompanyOverview,
        balance: &BalanceSheet,
        earnings: Option<&EarningsHistory>,
    ) -> Self {
        let (previous_eps, latest_eps) = earnings
            .and_then(EarningsHistory::last_two_years)
            .map_or((None, None), |(p, l)| (Some(p), Some(l)));

        Self {
            symbol: overview.symbol.clone(),
            fiscal_date_ending: balance.fiscal_date_ending.clone(),
            profitability: Profitability {
                gross_margin: ratios::gross_margin(overview.gross_profit_ttm, overview.revenue_ttm),
                operating_margin: overview.operating_margin,
                profit_margin: overview.profit_margin,
                roe: overview.return_on_equity,
                roa: overview.return_on_assets,
            },
            valuation: Valuation {
                pe_ratio: overview.pe_ratio,
                forward_pe: overview.forward_pe,
                price_to_book: overview.price_to_book,
                price_to_sales: overview.price_to_sales,
                ev_to_ebitda: overview.ev_to_ebitda,
            },
            growth: Growth {
                revenue_growth: overview.quarterly_revenue_growth,
                earnings_growth: ratios::growth_rate(previous_eps, latest_eps),
                earnings_quarterly_growth: overview.quarterly_earnings_growth,
            },
            financial_health: FinancialHealth {
                current_ratio: ratios::current_ratio(
                    balance.total_current_assets,
                    balance.total_current_liabilities,
                ),
                quick_ratio: ratios::quick_ratio(
                    balance.total_current_assets,
                    balance.inventory,
                    balance.total_current_liabilities,
                ),
                debt_to_equity: ratios::debt_to_equity(
                    balance.total_debt,
                    balance.total_shareholder_equity,
                ),
                total_debt: balance.total_debt,
                total_cash: balance.cash,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct FinancialMetricsParams {
    #[serde(alias = "symbol")]
    ticker: String,
}

/// Tool returning [`FinancialMetrics`]
pub struct FinancialMetricsTool {
    fundamentals: Option<Arc<dyn FundamentalsSource>>,
    cache: MarketCache,
    retry: RetryPolicy,
}

impl FinancialMetricsTool {
    pub fn new(
        fundamentals: Option<Arc<dyn FundamentalsSource>>,
        cache: MarketCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fundamentals,
            cache,
            retry,
        }
    }

    pub async fn metrics(&self, ticker: &Ticker) -> Result<FinancialMetrics> {
        let fundamentals = self.fundamentals.as_deref().ok_or_else(|| {
            MarketError::ConfigError(format!(
                "financial metrics are unavailable: {ALPHA_VANTAGE_KEY_ENV} is not set"
            ))
        })?;
        let symbol = ticker.as_str();

        let balance_key = CacheKey::new(symbol, "balance_sheet", json!({}));
        let earnings_key = CacheKey::new(symbol, "earnings", json!({}));
        let (overview, balance, earnings) = futures::join!(
            cached_overview(fundamentals, &self.cache, &self.retry, ticker),
            cached(&self.cache, balance_key, || {
                retried(&self.retry, "alpha_vantage.balance_sheet", || {
                    fundamentals.balance_sheet(symbol)
                })
            }),
            cached(&self.cache, earnings_key, || {
                retried(&self.retry, "alpha_vantage.earnings", || {
                    fundamentals.earnings(symbol)
                })
            }),
        );
        let (overview, balance) = (overview?, balance?);

        let earnings = earnings
            .inspect_err(|e| warn!(symbol, error = %e, "Earnings history unavailable"))
            .ok();

        let metrics = FinancialMetrics::compute(&overview, &balance, earnings.as_ref());
        info!(symbol, fiscal_date = ?metrics.fiscal_date_ending, "Computed financial metrics");
        Ok(metrics)
    }
}

#[async_trait]
impl Tool for FinancialMetricsTool {
    async fn execute(&self, params: Value) -> AgentResult<Value> {
        let params: FinancialMetricsParams = parse_params(params)?;
        let ticker = Ticker::parse(&params.ticker)?;
        let metrics = self.metrics(&ticker).await?;
        Ok(serde_json::to_value(metrics).map_err(MarketError::from)?)
    }

    fn name(&self) -> &str {
        "financial_metrics"
    }

    fn description(&self) -> &str {
        "Get detailed financial metrics and ratios for a ticker, grouped as profitability \
         (gross/operating/profit margin, ROE, ROA), valuation (P/E, forward P/E, P/B, P/S, \
         EV/EBITDA), growth (revenue, earnings, quarterly earnings) and financial health \
         (current ratio, quick ratio, debt/equity, total debt, total cash). \
         Ratios are fractions: 0.25 means 25%."
    }

    fn input_schema(&self) -> Value {
        schema::object(json!({ "ticker": schema::ticker() }), &["ticker"])
    }
}
