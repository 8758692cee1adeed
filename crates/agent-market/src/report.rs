//! Analysis report assembled from a pipeline run
//!
//! Stage answers are free text that should end in a JSON object. The report
//! keeps the raw text, the parsed object when one can be found, and a few key
//! takeaways lifted from well-known fields.

use agent_llm::TokenUsage;
use agent_workflow::{PipelineRun, StageOutput, StageStatus};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::ticker::Ticker;
use crate::tools::StockSnapshot;

static FENCED_JSON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok());

/// Pull the JSON object out of an agent answer
///
/// A fenced ```json block wins; otherwise the first balanced `{...}` that
/// parses is used.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(re) = FENCED_JSON.as_ref() {
        for caps in re.captures_iter(text) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str(&caps[1]) {
                return Some(value);
            }
        }
    }

    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str(&text[open..=close]) {
                return Some(value);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the `}` closing the `{` at `open`, skipping braces in strings
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Value at `path` rendered as display text
fn text_at(value: Option<&Value>, path: &[&str]) -> Option<String> {
    let mut current = value?;
    for key in path {
        current = current.get(key)?;
    }
    match current {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// One stage's output plus its parsed JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    #[serde(flatten)]
    pub output: StageOutput,
    pub json: Option<Value>,
}

impl StageReport {
    pub fn new(output: StageOutput) -> Self {
        let json = if output.is_completed() {
            extract_json(&output.text)
        } else {
            None
        };
        Self { output, json }
    }

    pub fn id(&self) -> &str {
        &self.output.stage_id
    }

    pub fn is_completed(&self) -> bool {
        self.output.is_completed()
    }
}

/// Headline numbers for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTakeaways {
    pub market_sentiment: Option<String>,
    pub price_target: Option<String>,
    pub fair_value: Option<String>,
    pub overall_risk: Option<String>,
    pub recommendation: Option<String>,
    pub confidence: Option<String>,
}

impl KeyTakeaways {
    pub fn from_stages(stages: &[StageReport]) -> Self {
        let json = |id: &str| {
            stages
                .iter()
                .find(|s| s.id() == id)
                .and_then(|s| s.json.as_ref())
        };
        Self {
            market_sentiment: text_at(json("market"), &["market_sentiment"]),
            price_target: text_at(json("technical"), &["price_targets", "target_price"]),
            fair_value: text_at(json("fundamental"), &["valuation", "fair_value"]),
            overall_risk: text_at(json("risk"), &["overall_risk"]),
            recommendation: text_at(json("strategy"), &["recommendation", "action"]),
            confidence: text_at(json("strategy"), &["recommendation", "confidence"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Label and value pairs, in display order
    pub fn entries(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("Market sentiment", self.market_sentiment.as_deref()),
            ("Price target", self.price_target.as_deref()),
            ("Fair value", self.fair_value.as_deref()),
            ("Overall risk", self.overall_risk.as_deref()),
            ("Recommendation", self.recommendation.as_deref()),
            ("Confidence", self.confidence.as_deref()),
        ]
    }
}

/// Everything a run produced for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub ticker: Ticker,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub snapshot: Option<StockSnapshot>,
    /// Why the snapshot is missing, when it was requested
    pub snapshot_error: Option<String>,
    pub key_takeaways: KeyTakeaways,
    pub stages: Vec<StageReport>,
    pub total_usage: TokenUsage,
}

impl AnalysisReport {
    pub fn from_run(
        ticker: Ticker,
        started_at: DateTime<Utc>,
        run: PipelineRun,
        snapshot: Option<StockSnapshot>,
        snapshot_error: Option<String>,
    ) -> Self {
        let total_usage = run.total_usage();
        let stages: Vec<StageReport> = run.outputs.into_iter().map(StageReport::new).collect();
        Self {
            run_id: run.run_id,
            ticker,
            started_at,
            duration_ms: run.duration_ms,
            snapshot,
            snapshot_error,
            key_takeaways: KeyTakeaways::from_stages(&stages),
            stages,
            total_usage,
        }
    }

    pub fn stage(&self, id: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.id() == id)
    }

    /// Stages that failed or were skipped
    pub fn failures(&self) -> Vec<&StageReport> {
        self.stages.iter().filter(|s| !s.is_completed()).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.stages.iter().any(|s| !s.is_completed())
    }

    /// Report as a Markdown document
    pub fn to_markdown(&self) -> String {
        let mut md = format!("# Stock Analysis: {}\n\n", self.ticker);
        md.push_str(&format!(
            "Generated {} · run `{}` · {:.1}s · {} tokens\n",
            self.started_at.format("%Y-%m-%d %H:%M UTC"),
            self.run_id,
            self.duration_ms as f64 / 1000.0,
            self.total_usage.total()
        ));

        if !self.key_takeaways.is_empty() {
            md.push_str("\n## Key Takeaways\n\n");
            for (label, value) in self.key_takeaways.entries() {
                if let Some(value) = value {
                    md.push_str(&format!("- **{label}:** {value}\n"));
                }
            }
        }

        if let Some(snapshot) = &self.snapshot {
            md.push_str("\n## Snapshot\n\n| Metric | Value |\n|---|---|\n");
            md.push_str(&format!("| Price | {:.2} |\n", snapshot.current_price));
            if let Some(change) = snapshot.one_year_change_pct {
                md.push_str(&format!("| 1y change | {change:+.1}% |\n"));
            }
            if let (Some(low), Some(high)) = (snapshot.week_52_low, snapshot.week_52_high) {
                md.push_str(&format!("| 52w range | {low:.2} - {high:.2} |\n"));
            }
            if let Some(pe) = snapshot.pe_ratio {
                md.push_str(&format!("| P/E | {pe:.1} |\n"));
            }
            if let Some(rsi) = snapshot.technicals.rsi_14 {
                md.push_str(&format!("| RSI(14) | {rsi:.1} |\n"));
            }
        } else if let Some(error) = &self.snapshot_error {
            md.push_str(&format!("\n> Market snapshot unavailable: {error}\n"));
        }

        for stage in &self.stages {
            let out = &stage.output;
            md.push_str(&format!("\n## {}\n\n", out.title));
            md.push_str(&format!(
                "_{} · {} tool call(s) · {} tokens_\n\n",
                out.agent,
                out.tool_calls,
                out.usage.total()
            ));
            match &out.status {
                StageStatus::Completed => match &stage.json {
                    Some(json) => {
                        let pretty =
                            serde_json::to_string_pretty(json).unwrap_or_else(|_| out.text.clone());
                        md.push_str(&format!("```json\n{pretty}\n```\n"));
                    }
                    None => {
                        md.push_str(out.text.trim());
                        md.push('\n');
                    }
                },
                StageStatus::Failed { message } => {
                    md.push_str(&format!("> **Failed:** {message}\n"));
                }
                StageStatus::Skipped { reason } => {
                    md.push_str(&format!("> **Skipped:** {reason}\n"));
                }
            }
            if out.truncated {
                md.push_str("\n_Stopped at the iteration limit; the answer may be incomplete._\n");
            }
        }

        md
    }
}
