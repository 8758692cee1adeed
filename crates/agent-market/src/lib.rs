//! Stock analysis crew
//!
//! Five analyst agents study one ticker and hand their findings down a
//! staged pipeline:
//!
//! 1. Market Intelligence Officer: market position, competition, sentiment
//! 2. Technical Analysis Specialist and Fundamental Analysis Expert, in parallel
//! 3. Risk Assessment Analyst
//! 4. Portfolio Strategy Expert: the final recommendation
//!
//! The agents call three tools backed by live data:
//!
//! - `stock_data`: Yahoo Finance quote, one-year history and indicators
//! - `financial_metrics`: Alpha Vantage ratios (needs `ALPHA_VANTAGE_API_KEY`)
//! - `web_search`: DuckDuckGo instant answers
//!
//! Provider calls are cached, rate limited and retried with exponential
//! backoff. A failing stage is recorded in the [`AnalysisReport`] and the run
//! carries on.
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_market::{MarketAnalysisCrew, MarketConfig};
//! use agent_runtime::AgentRuntime;
//! use agent_utils::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let runtime = AgentRuntime::builder()
//!         .provider(agent_llm::providers::from_settings(&config.llm)?)
//!         .settings(&config.llm)
//!         .retry_policy(config.retry.clone())
//!         .build()?;
//!
//!     let crew = MarketAnalysisCrew::from_config(&runtime, MarketConfig::default().with_env_api_key())?;
//!     let report = crew.analyze("AAPL").await?;
//!     println!("{}", report.to_markdown());
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod api;
pub mod cache;
pub mod config;
pub mod crew;
pub mod error;
pub mod indicators;
pub mod prompts;
pub mod ratios;
pub mod report;
pub mod ticker;
pub mod tools;

pub use agents::{AnalystAgent, AnalystRole, ROLES};
pub use config::{ALPHA_VANTAGE_KEY_ENV, MarketConfig, MarketConfigBuilder};
pub use crew::MarketAnalysisCrew;
pub use error::{MarketError, Result};
pub use indicators::TechnicalSummary;
pub use report::{AnalysisReport, KeyTakeaways, StageReport, extract_json};
pub use ticker::Ticker;
pub use tools::{
    FinancialMetrics, FinancialMetricsTool, MarketToolbox, StockDataTool, StockSnapshot, ToolKind,
    WebSearchTool,
};
