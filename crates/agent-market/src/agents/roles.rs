//! The five analyst roles of the crew
//!
//! Each role fixes a persona (role, goal, backstory), the tools it may call,
//! the stages whose output it reads, a task template rendered per ticker and
//! the JSON shape its final answer should take.

use crate::tools::ToolKind;

/// Static definition of one analyst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalystRole {
    /// Pipeline stage id
    pub stage_id: &'static str,
    /// Section title in the report
    pub title: &'static str,
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub tools: &'static [ToolKind],
    pub depends_on: &'static [&'static str],
    /// Name of the task template in [`crate::prompts::PromptLibrary`]
    pub template: &'static str,
    pub expected_output: &'static str,
}

pub const MARKET: AnalystRole = AnalystRole {
    stage_id: "market",
    title: "Market Research",
    role: "Market Intelligence Officer",
    goal: "Provide actionable market research and competitive analysis",
    backstory: "Expert market researcher focused on industry trends and competitive analysis. \
                Specializes in identifying market opportunities and risks.",
    tools: &[ToolKind::WebSearch, ToolKind::StockData],
    depends_on: &[],
    template: "task.market",
    expected_output: r#"{
  "market_position": "Current market standing and trends",
  "competitive_analysis": {
    "advantages": ["List of competitive advantages"],
    "threats": ["List of potential threats"]
  },
  "industry_analysis": "Industry dynamics and market share details",
  "recent_developments": ["List of recent news and events"],
  "market_sentiment": "Overall market sentiment analysis"
}"#,
};

pub const TECHNICAL: AnalystRole = AnalystRole {
    stage_id: "technical",
    title: "Technical Analysis",
    role: "Technical Analysis Specialist",
    goal: "Provide technical analysis and price targets",
    backstory: "Technical analysis expert specializing in price patterns and momentum indicators. \
                Focuses on identifying entry/exit points based on technical signals.",
    tools: &[ToolKind::StockData],
    depends_on: &["market"],
    template: "task.technical",
    expected_output: r#"{
  "trend_analysis": "Current price trend analysis",
  "support_resistance": {
    "support_levels": ["List of support prices"],
    "resistance_levels": ["List of resistance prices"]
  },
  "volume_analysis": "Trading volume analysis",
  "technical_indicators": {
    "rsi": "RSI value and interpretation",
    "macd": "MACD analysis"
  },
  "price_targets": {
    "entry_points": ["List of recommended entry prices"],
    "exit_points": ["List of recommended exit prices"],
    "target_price": "Price target"
  }
}"#,
};

pub const FUNDAMENTAL: AnalystRole = AnalystRole {
    stage_id: "fundamental",
    title: "Fundamental Analysis",
    role: "Fundamental Analysis Expert",
    goal: "Evaluate financial health and provide valuation analysis",
    backstory: "Financial analysis expert specializing in company valuations and financial \
                metrics. Focuses on analyzing financial statements and ratios.",
    tools: &[ToolKind::StockData, ToolKind::FinancialMetrics],
    depends_on: &["market"],
    template: "task.fundamental",
    expected_output: r#"{
  "financial_health": {
    "liquidity_ratios": "Analysis of liquidity",
    "solvency_ratios": "Analysis of solvency",
    "overall_health": "Overall financial health assessment"
  },
  "growth_metrics": {
    "revenue_growth": "Revenue growth analysis",
    "earnings_growth": "Earnings growth analysis",
    "future_outlook": "Growth outlook"
  },
  "profitability": {
    "margins": "Margin analysis",
    "returns": "Return metrics analysis"
  },
  "valuation": {
    "current_valuation": "Current valuation metrics",
    "fair_value": "Calculated fair value",
    "valuation_assessment": "Over/undervalued assessment"
  },
  "risk_analysis": "Comprehensive risk assessment"
}"#,
};

pub const RISK: AnalystRole = AnalystRole {
    stage_id: "risk",
    title: "Risk Assessment",
    role: "Risk Assessment Analyst",
    goal: "Identify, rate and explain the risks of holding the stock",
    backstory: "Risk manager who stress-tests investment theses. Weighs market, business, \
                financial and event risks against the findings of the other analysts.",
    tools: &[ToolKind::StockData, ToolKind::FinancialMetrics, ToolKind::WebSearch],
    depends_on: &["market", "technical", "fundamental"],
    template: "task.risk",
    expected_output: r#"{
  "overall_risk": "Low/Medium/High with a one-line rationale",
  "risk_factors": [
    {"category": "market/business/financial/regulatory/event", "description": "Risk description", "severity": "Low/Medium/High"}
  ],
  "volatility_assessment": "Price volatility and drawdown analysis",
  "downside_scenarios": ["Plausible adverse scenarios with price impact"],
  "mitigation": ["Ways to reduce or hedge the identified risks"]
}"#,
};

pub const STRATEGY: AnalystRole = AnalystRole {
    stage_id: "strategy",
    title: "Investment Strategy",
    role: "Portfolio Strategy Expert",
    goal: "Synthesize all analyses into actionable investment recommendations",
    backstory: "Investment strategist who combines market, technical, fundamental and risk \
                analysis to create comprehensive investment strategies.",
    tools: &[ToolKind::StockData],
    depends_on: &["market", "technical", "fundamental", "risk"],
    template: "task.strategy",
    expected_output: r#"{
  "recommendation": {
    "action": "Buy/Sell/Hold recommendation",
    "confidence": "Confidence level in recommendation",
    "time_horizon": "Recommended investment timeframe"
  },
  "position_sizing": {
    "recommended_size": "Recommended position size",
    "rationale": "Rationale for position size"
  },
  "risk_management": {
    "stop_loss": "Stop loss price and rationale",
    "risk_reward_ratio": "Risk/reward ratio",
    "max_drawdown": "Maximum acceptable drawdown"
  },
  "execution_strategy": {
    "entry_strategy": "Detailed entry strategy",
    "exit_strategy": "Detailed exit strategy",
    "monitoring_points": ["Key points to monitor"]
  },
  "portfolio_fit": "Analysis of how this fits into a portfolio"
}"#,
};

/// All roles in pipeline order
pub static ROLES: [AnalystRole; 5] = [MARKET, TECHNICAL, FUNDAMENTAL, RISK, STRATEGY];

/// Role for a stage id
pub fn role(stage_id: &str) -> Option<&'static AnalystRole> {
    ROLES.iter().find(|r| r.stage_id == stage_id)
}

/// Stage ids in pipeline order
pub fn stage_ids() -> impl Iterator<Item = &'static str> {
    ROLES.iter().map(|r| r.stage_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        assert_eq!(
            stage_ids().collect::<Vec<_>>(),
            vec!["market", "technical", "fundamental", "risk", "strategy"]
        );
    }

    #[test]
    fn test_dependencies_point_backwards() {
        for (i, role) in ROLES.iter().enumerate() {
            for dep in role.depends_on {
                let pos = ROLES.iter().position(|r| r.stage_id == *dep).unwrap();
                assert!(pos < i, "{} depends on later stage {dep}", role.stage_id);
            }
        }
    }

    #[test]
    fn test_expected_outputs_are_json() {
        for role in &ROLES {
            let parsed: serde_json::Value = serde_json::from_str(role.expected_output)
                .unwrap_or_else(|e| panic!("{}: {e}", role.stage_id));
            assert!(parsed.is_object());
        }
    }

    #[test]
    fn test_tool_bindings() {
        assert_eq!(role("market").unwrap().tools, &[ToolKind::WebSearch, ToolKind::StockData]);
        assert_eq!(role("technical").unwrap().tools, &[ToolKind::StockData]);
        assert!(role("risk").unwrap().tools.contains(&ToolKind::FinancialMetrics));
        assert!(role("unknown").is_none());
    }
}
