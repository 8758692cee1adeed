//! The market analysis crew
//!
//! Wires the five analyst roles into a [`Pipeline`]: market research first,
//! technical and fundamental analysis side by side, then risk assessment,
//! then the investment strategy that reads everything before it.

use agent_core::Agent;
use agent_runtime::AgentRuntime;
use agent_workflow::{Pipeline, Stage};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::{AnalystAgent, AnalystRole, ROLES};
use crate::config::MarketConfig;
use crate::error::Result;
use crate::prompts::PromptLibrary;
use crate::report::{AnalysisReport, StageReport};
use crate::ticker::Ticker;
use crate::tools::{MarketToolbox, StockSnapshot};

/// Runs the full analysis for a ticker
pub struct MarketAnalysisCrew {
    config: MarketConfig,
    toolbox: MarketToolbox,
    pipeline: Pipeline,
}

impl MarketAnalysisCrew {
    /// Build the crew over an existing toolbox
    pub fn new(runtime: &AgentRuntime, toolbox: MarketToolbox, config: MarketConfig) -> Result<Self> {
        config.validate()?;
        let prompts = Arc::new(PromptLibrary::new()?);

        let mut builder = Pipeline::builder();
        for role in &ROLES {
            let agent = AnalystAgent::new(runtime, &prompts, &toolbox, role)?;
            builder = builder.stage(
                Stage::new(
                    role.stage_id,
                    role.title,
                    Arc::new(agent) as Arc<dyn Agent>,
                    task_prompt(Arc::clone(&prompts), role),
                )
                .depends_on(role.depends_on.iter().copied()),
            );
        }
        let pipeline = builder.build()?;

        info!(
            stages = ROLES.len(),
            fundamentals = config.has_fundamentals(),
            "Market analysis crew ready"
        );
        Ok(Self {
            config,
            toolbox,
            pipeline,
        })
    }

    /// Build the crew over the live data providers
    pub fn from_config(runtime: &AgentRuntime, config: MarketConfig) -> Result<Self> {
        let toolbox = MarketToolbox::from_config(&config)?;
        Self::new(runtime, toolbox, config)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn toolbox(&self) -> &MarketToolbox {
        &self.toolbox
    }

    /// Run every stage for `ticker`
    ///
    /// Fails only when the ticker is malformed or rejected by the pre-flight
    /// check. Stage failures and a missing snapshot are recorded in the
    /// report.
    pub async fn analyze(&self, ticker: &str) -> Result<AnalysisReport> {
        let ticker = Ticker::parse(ticker)?;
        let started_at = Utc::now();
        info!(ticker = %ticker, "Starting analysis");

        if self.config.validate_ticker {
            self.toolbox.stock_data.validate(&ticker).await?;
        }

        let (snapshot, snapshot_error) = self.snapshot(&ticker).await;
        let run = self.pipeline.run(ticker.as_str()).await;
        let report = AnalysisReport::from_run(ticker, started_at, run, snapshot, snapshot_error);

        info!(
            ticker = %report.ticker,
            failed = report.failures().len(),
            tokens = report.total_usage.total(),
            "Analysis finished"
        );
        Ok(report)
    }

    /// Run a single stage for `ticker`, without upstream context
    pub async fn analyze_stage(&self, ticker: &str, stage_id: &str) -> Result<StageReport> {
        let ticker = Ticker::parse(ticker)?;
        if self.config.validate_ticker {
            self.toolbox.stock_data.validate(&ticker).await?;
        }
        let output = self.pipeline.run_stage(stage_id, ticker.as_str()).await?;
        Ok(StageReport::new(output))
    }

    /// Display snapshot; fetching it also warms the cache for the agents
    async fn snapshot(&self, ticker: &Ticker) -> (Option<StockSnapshot>, Option<String>) {
        if !self.config.fetch_snapshot {
            return (None, None);
        }
        match self.toolbox.stock_data.snapshot(ticker).await {
            Ok(snapshot) => (Some(snapshot), None),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Market snapshot unavailable");
                (None, Some(e.to_string()))
            }
        }
    }
}

fn task_prompt(
    prompts: Arc<PromptLibrary>,
    role: &'static AnalystRole,
) -> impl Fn(&str) -> String + Send + Sync + 'static {
    move |ticker| {
        prompts.render_task(role, ticker).unwrap_or_else(|e| {
            warn!(stage = role.stage_id, error = %e, "Task template failed to render");
            format!(
                "Analyze {ticker} as the {}.\n\nProvide a JSON response shaped like:\n{}",
                role.role, role.expected_output
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::roles::{FUNDAMENTAL, MARKET, RISK, STRATEGY, TECHNICAL};
    use crate::api::{MockPriceSource, MockSearchSource};
    use crate::error::MarketError;
    use crate::tools::fixtures::healthy_prices;
    use agent_llm::{CompletionRequest, CompletionResponse, LLMError};
    use agent_runtime::testing::{ScriptedProvider, reply};
    use agent_utils::RetryPolicy;
    use agent_workflow::{PipelineError, StageStatus};

    fn answer(system: &str) -> agent_llm::Result<CompletionResponse> {
        let text = if system.contains(MARKET.role) {
            r#"{"market_sentiment": "Bullish"}"#
        } else if system.contains(TECHNICAL.role) {
            r#"```json
{"price_targets": {"target_price": "$210"}}
```"#
        } else if system.contains(FUNDAMENTAL.role) {
            r#"{"valuation": {"fair_value": "$190"}}"#
        } else if system.contains(RISK.role) {
            r#"{"overall_risk": "Medium"}"#
        } else {
            r#"{"recommendation": {"action": "Buy", "confidence": "High"}}"#
        };
        Ok(reply(text, 10, 5))
    }

    fn system_of(request: &CompletionRequest) -> &str {
        request.system.as_deref().unwrap_or_default()
    }

    fn user_input(provider: &ScriptedProvider, role: &AnalystRole) -> String {
        provider
            .requests()
            .iter()
            .find(|r| system_of(r).contains(role.role))
            .and_then(|r| r.messages[0].text().map(str::to_string))
            .unwrap_or_default()
    }

    fn runtime(provider: Arc<ScriptedProvider>) -> AgentRuntime {
        AgentRuntime::builder()
            .provider(provider)
            .retry_policy(RetryPolicy::fast())
            .build()
            .unwrap()
    }

    fn crew(provider: Arc<ScriptedProvider>, prices: MockPriceSource) -> MarketAnalysisCrew {
        let config = MarketConfig::builder()
            .retry(RetryPolicy::fast())
            .build()
            .unwrap();
        let toolbox = MarketToolbox::new(
            Arc::new(prices),
            None,
            Arc::new(MockSearchSource::new()),
            &config,
        );
        MarketAnalysisCrew::new(&runtime(provider), toolbox, config).unwrap()
    }

    fn valid_prices() -> MockPriceSource {
        let mut prices = healthy_prices(1);
        prices.expect_validate_symbol().returning(|_| Ok(()));
        prices
    }

    #[test]
    fn test_pipeline_shape() {
        let crew = crew(ScriptedProvider::new(vec![]), MockPriceSource::new());
        assert_eq!(
            crew.pipeline().tiers(),
            vec![
                vec!["market"],
                vec!["technical", "fundamental"],
                vec!["risk"],
                vec!["strategy"]
            ]
        );
    }

    #[tokio::test]
    async fn test_full_run() {
        let provider = ScriptedProvider::with_responder(|r| answer(system_of(r)));
        let report = crew(provider.clone(), valid_prices())
            .analyze(" aapl ")
            .await
            .unwrap();

        assert_eq!(report.ticker.as_str(), "AAPL");
        let ids: Vec<_> = report.stages.iter().map(StageReport::id).collect();
        assert_eq!(ids, vec!["market", "technical", "fundamental", "risk", "strategy"]);
        assert!(!report.has_failures());
        assert_eq!(report.snapshot.as_ref().unwrap().current_price, 359.0);

        let takeaways = &report.key_takeaways;
        assert_eq!(takeaways.market_sentiment.as_deref(), Some("Bullish"));
        assert_eq!(takeaways.price_target.as_deref(), Some("$210"));
        assert_eq!(takeaways.fair_value.as_deref(), Some("$190"));
        assert_eq!(takeaways.overall_risk.as_deref(), Some("Medium"));
        assert_eq!(takeaways.recommendation.as_deref(), Some("Buy"));
        assert_eq!(report.total_usage.total(), 75);
        assert_eq!(provider.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_downstream_input_carries_upstream_outputs_in_order() {
        let provider = ScriptedProvider::with_responder(|r| answer(system_of(r)));
        crew(provider.clone(), valid_prices()).analyze("NVDA").await.unwrap();

        let market_input = user_input(&provider, &MARKET);
        assert!(market_input.starts_with("Research NVDA market conditions"));
        assert!(!market_input.contains("### "));

        let strategy_input = user_input(&provider, &STRATEGY);
        assert!(strategy_input.starts_with("Develop an investment strategy for NVDA"));
        let positions: Vec<usize> = ["Market Research", "Technical Analysis", "Fundamental Analysis", "Risk Assessment"]
            .iter()
            .map(|title| strategy_input.find(&format!("### {title}\n")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(strategy_input.contains(r#"{"overall_risk": "Medium"}"#));
    }

    #[tokio::test]
    async fn test_failed_stage_is_reported_and_run_continues() {
        let provider = ScriptedProvider::with_responder(|r| {
            if system_of(r).contains(TECHNICAL.role) {
                Err(LLMError::RequestFailed("HTTP 503: overloaded".into()))
            } else {
                answer(system_of(r))
            }
        });
        let report = crew(provider.clone(), valid_prices())
            .analyze("TSLA")
            .await
            .unwrap();

        assert_eq!(report.stages.len(), 5);
        let technical = report.stage("technical").unwrap();
        match &technical.output.status {
            StageStatus::Failed { message } => {
                assert!(message.contains("failed after 3 attempt(s)"), "{message}");
                assert!(message.contains("HTTP 503"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(report.stage("strategy").unwrap().is_completed());
        assert!(report.key_takeaways.price_target.is_none());
        assert_eq!(report.key_takeaways.recommendation.as_deref(), Some("Buy"));

        let risk_input = user_input(&provider, &RISK);
        assert!(risk_input.contains("The Technical Analysis is unavailable: it failed"));
    }

    #[tokio::test]
    async fn test_unknown_ticker_stops_before_any_agent_runs() {
        let mut prices = MockPriceSource::new();
        prices
            .expect_validate_symbol()
            .returning(|s| Err(MarketError::InvalidSymbol(format!("{s} not found"))));
        let provider = ScriptedProvider::with_responder(|r| answer(system_of(r)));

        let err = crew(provider.clone(), prices).analyze("ZZZZZ").await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidSymbol(_)));
        assert!(provider.requests().is_empty());

        let err = crew(provider.clone(), MockPriceSource::new())
            .analyze("not a ticker")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidSymbol(_)));
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_not_fatal() {
        let mut prices = MockPriceSource::new();
        prices.expect_validate_symbol().returning(|_| Ok(()));
        prices
            .expect_latest_quote()
            .returning(|_| Err(MarketError::YahooFinanceError("connection reset".into())));
        prices
            .expect_history()
            .returning(|_, _| Err(MarketError::YahooFinanceError("connection reset".into())));
        let provider = ScriptedProvider::with_responder(|r| answer(system_of(r)));

        let report = crew(provider, prices).analyze("IBM").await.unwrap();
        assert!(report.snapshot.is_none());
        assert!(!report.has_failures());
        assert!(
            report
                .snapshot_error
                .as_deref()
                .unwrap()
                .contains("failed after 3 attempt(s)")
        );
    }

    #[tokio::test]
    async fn test_single_stage() {
        let provider = ScriptedProvider::with_responder(|r| answer(system_of(r)));
        let mut prices = MockPriceSource::new();
        prices.expect_validate_symbol().returning(|_| Ok(()));
        let crew = crew(provider.clone(), prices);

        let stage = crew.analyze_stage("amd", "risk").await.unwrap();
        assert!(stage.is_completed());
        assert_eq!(stage.json.unwrap()["overall_risk"], "Medium");
        assert!(!user_input(&provider, &RISK).contains("### "));

        let err = crew.analyze_stage("amd", "valuation").await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::Pipeline(PipelineError::UnknownStage(ref id)) if id == "valuation"
        ));
    }
}
