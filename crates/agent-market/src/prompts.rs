//! Prompt templates for the analyst roles
//!
//! Templates are minijinja sources compiled once into a [`PromptLibrary`].
//! The system prompt carries the persona, each task template carries the
//! ticker, what to focus on and which tools help; the shared frame appends
//! the expected JSON shape.

use minijinja::{Environment, UndefinedBehavior, context};

use crate::agents::roles::{AnalystRole, ROLES};
use crate::error::Result;

const SYSTEM: &str = "\
You are the {{ role }}.

Goal: {{ goal }}

{{ backstory }}

{% if tools %}You can call these tools: {{ tools | join(\", \") }}.
Prefer tool data over memory for prices, ratios and news, and say so when a tool reports data as unavailable.
{% endif %}\
Finish with a single JSON object that matches the expected output of your task. Do not invent numbers.";

const FRAME: &str = "\
{{ body | trim }}

Provide a detailed JSON response with your findings, shaped like:
{{ expected_output }}";

const MARKET_TASK: &str = "\
Research {{ ticker }} market conditions and competitive landscape.
Focus on:
1. Current market position and trends
2. Competitive analysis and market share
3. Industry dynamics and growth potential
4. Recent news and developments
5. Market sentiment analysis

Use web_search for news and industry context and stock_data for the current price picture.";

const TECHNICAL_TASK: &str = "\
Perform technical analysis on {{ ticker }}.
Focus on:
1. Price trends and patterns
2. Support and resistance levels
3. Volume analysis
4. Key technical indicators (RSI, MACD, moving averages)
5. Entry and exit points

Call stock_data for the indicator summary; set include_history when you need the daily series.
Build on the market research included below.";

const FUNDAMENTAL_TASK: &str = "\
Analyze {{ ticker }} fundamental metrics and financial health.
Focus on:
1. Financial ratios and health indicators
2. Growth metrics and trends
3. Profitability analysis
4. Valuation metrics
5. Risk assessment

Use financial_metrics for ratios and stock_data for price and valuation context.
Build on the market research included below.";

const RISK_TASK: &str = "\
Assess the risks of holding {{ ticker }}.
Focus on:
1. Market and sector risk
2. Business and competitive risk
3. Financial and balance sheet risk
4. Price volatility and drawdown history
5. Event, regulatory and macro risk

Rate each risk and give an overall rating of Low, Medium or High.
Cross-check the market, technical and fundamental analyses included below with stock_data, financial_metrics and web_search.";

const STRATEGY_TASK: &str = "\
Develop an investment strategy for {{ ticker }} based on all analyses.
Focus on:
1. Investment recommendation (Buy/Sell/Hold)
2. Position sizing
3. Risk management strategy
4. Entry/exit strategy
5. Portfolio considerations

Synthesize the market, technical, fundamental and risk analyses included below; use stock_data to confirm current levels.";

/// Compiled templates for every role
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template("system", SYSTEM)?;
        env.add_template("frame", FRAME)?;
        env.add_template("task.market", MARKET_TASK)?;
        env.add_template("task.technical", TECHNICAL_TASK)?;
        env.add_template("task.fundamental", FUNDAMENTAL_TASK)?;
        env.add_template("task.risk", RISK_TASK)?;
        env.add_template("task.strategy", STRATEGY_TASK)?;

        let library = Self { env };
        // Surface missing or broken role templates at construction
        for role in &ROLES {
            library.render_system(role)?;
            library.render_task(role, "CHECK")?;
        }
        Ok(library)
    }

    /// Persona and tool list for `role`
    pub fn render_system(&self, role: &AnalystRole) -> Result<String> {
        let tools: Vec<&str> = role.tools.iter().map(|t| t.name()).collect();
        let rendered = self.env.get_template("system")?.render(context! {
            role => role.role,
            goal => role.goal,
            backstory => role.backstory,
            tools => tools,
        })?;
        Ok(rendered)
    }

    /// Task for `role` on `ticker`, ending with the expected JSON shape
    pub fn render_task(&self, role: &AnalystRole, ticker: &str) -> Result<String> {
        let body = self
            .env
            .get_template(role.template)?
            .render(context! { ticker => ticker })?;
        let rendered = self.env.get_template("frame")?.render(context! {
            body => body,
            expected_output => role.expected_output,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::roles::{MARKET, RISK, STRATEGY, TECHNICAL};

    #[test]
    fn test_system_prompt() {
        let prompts = PromptLibrary::new().unwrap();
        let system = prompts.render_system(&MARKET).unwrap();

        assert!(system.starts_with("You are the Market Intelligence Officer."));
        assert!(system.contains("Goal: Provide actionable market research"));
        assert!(system.contains("You can call these tools: web_search, stock_data."));
        assert!(system.ends_with("Do not invent numbers."));
    }

    #[test]
    fn test_task_prompt_carries_ticker_and_shape() {
        let prompts = PromptLibrary::new().unwrap();
        let task = prompts.render_task(&TECHNICAL, "NVDA").unwrap();

        assert!(task.starts_with("Perform technical analysis on NVDA."));
        assert!(task.contains("4. Key technical indicators (RSI, MACD, moving averages)"));
        assert!(task.contains("\"price_targets\""));
        assert!(task.trim_end().ends_with('}'));
    }

    #[test]
    fn test_every_role_renders() {
        let prompts = PromptLibrary::new().unwrap();
        for role in &ROLES {
            let task = prompts.render_task(role, "BRK.B").unwrap();
            assert!(task.contains("BRK.B"), "{}", role.stage_id);
            assert!(task.contains(role.expected_output));
        }
    }

    #[test]
    fn test_downstream_tasks_mention_prior_work() {
        let prompts = PromptLibrary::new().unwrap();
        assert!(prompts.render_task(&RISK, "AMD").unwrap().contains("Low, Medium or High"));
        assert!(
            prompts
                .render_task(&STRATEGY, "AMD")
                .unwrap()
                .contains("market, technical, fundamental and risk analyses")
        );
    }
}
