//! Terminal rendering of analysis reports

use agent_market::{AnalysisReport, KeyTakeaways, ROLES, StageReport, StockSnapshot};
use agent_workflow::StageStatus;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::fmt::Write as _;

const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const CHART_WIDTH: usize = 60;
const RED: &str = "\x1b[1;31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn paint(text: &str, style: &str, color: bool) -> String {
    if color {
        format!("{style}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Red banner for failures
pub fn error_banner(message: &str, color: bool) -> String {
    paint(&format!("✖ Error: {message}"), RED, color)
}

/// Average `values` into at most `width` buckets
fn downsample(values: &[f64], width: usize) -> Vec<f64> {
    if values.len() <= width || width == 0 {
        return values.to_vec();
    }
    (0..width)
        .map(|i| {
            let start = i * values.len() / width;
            let end = ((i + 1) * values.len() / width).max(start + 1);
            let bucket = &values[start..end];
            bucket.iter().sum::<f64>() / bucket.len() as f64
        })
        .collect()
}

/// One-line chart of `values`, scaled between their min and max
pub fn sparkline(values: &[f64], width: usize) -> String {
    let values = downsample(values, width);
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;

    values
        .iter()
        .map(|&v| {
            if span <= f64::EPSILON {
                SPARKS[SPARKS.len() / 2]
            } else {
                let level = ((v - min) / span * (SPARKS.len() - 1) as f64).round() as usize;
                SPARKS[level.min(SPARKS.len() - 1)]
            }
        })
        .collect()
}

/// Volume bars scaled from zero
pub fn volume_bars(volumes: &[u64], width: usize) -> String {
    let values: Vec<f64> = volumes.iter().map(|&v| v as f64).collect();
    let values = downsample(&values, width);
    let max = values.iter().copied().fold(0.0, f64::max);

    values
        .iter()
        .map(|&v| {
            if max <= 0.0 {
                SPARKS[0]
            } else {
                let level = (v / max * (SPARKS.len() - 1) as f64).round() as usize;
                SPARKS[level.min(SPARKS.len() - 1)]
            }
        })
        .collect()
}

/// `2.5e12` as `2.50T`
pub fn compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("{:.1}K", value / 1e3)
    } else {
        format!("{value:.2}")
    }
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "n/a".to_string())
}

fn metric_cards(snapshot: &StockSnapshot) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Price", "P/E", "Market Cap", "Dividend Yield", "1y Change", "RSI(14)"]);

    let change = snapshot.one_year_change_pct.map(|c| format!("{c:+.1}%"));
    let change_cell = match snapshot.one_year_change_pct {
        Some(c) if c < 0.0 => Cell::new(or_na(change)).fg(Color::Red),
        Some(_) => Cell::new(or_na(change)).fg(Color::Green),
        None => Cell::new("n/a"),
    };
    table.add_row(vec![
        Cell::new(format!("{:.2}", snapshot.current_price)),
        Cell::new(or_na(snapshot.pe_ratio.map(|v| format!("{v:.1}")))),
        Cell::new(or_na(snapshot.market_cap.map(compact))),
        Cell::new(or_na(snapshot.dividend_yield.map(|v| format!("{:.2}%", v * 100.0)))),
        change_cell,
        Cell::new(or_na(
            snapshot
                .technicals
                .rsi_14
                .map(|v| format!("{v:.1} {}", snapshot.technicals.rsi_signal.as_deref().unwrap_or(""))),
        )),
    ]);
    table
}

fn snapshot_section(out: &mut String, snapshot: &StockSnapshot) {
    let _ = writeln!(out, "{}", metric_cards(snapshot));
    if let (Some(low), Some(high)) = (snapshot.week_52_low, snapshot.week_52_high) {
        let _ = writeln!(out, "52-week range: {low:.2} - {high:.2}");
    }
    if !snapshot.history.is_empty() {
        let first = snapshot.history.dates.first().map_or("", String::as_str);
        let last = snapshot.history.dates.last().map_or("", String::as_str);
        let _ = writeln!(out, "\nPrice  {first} → {last}");
        let _ = writeln!(out, "  {}", sparkline(&snapshot.history.closes, CHART_WIDTH));
        let _ = writeln!(out, "Volume");
        let _ = writeln!(out, "  {}", volume_bars(&snapshot.history.volumes, CHART_WIDTH));
    }
    for note in &snapshot.notes {
        let _ = writeln!(out, "note: {note}");
    }
}

fn takeaways_table(takeaways: &KeyTakeaways) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Key Takeaway", "Value"]);
    for (label, value) in takeaways.entries() {
        table.add_row(vec![label, value.unwrap_or("n/a")]);
    }
    table
}

/// Headline for a stage, taken from the key takeaways
fn stage_takeaway(stage_id: &str, takeaways: &KeyTakeaways) -> Option<String> {
    let (label, value) = match stage_id {
        "market" => ("Sentiment", takeaways.market_sentiment.as_ref()),
        "technical" => ("Price target", takeaways.price_target.as_ref()),
        "fundamental" => ("Fair value", takeaways.fair_value.as_ref()),
        "risk" => ("Overall risk", takeaways.overall_risk.as_ref()),
        "strategy" => ("Recommendation", takeaways.recommendation.as_ref()),
        _ => return None,
    };
    value.map(|v| format!("{label}: {v}"))
}

/// One stage: title, takeaway, body or error banner
pub fn stage_section(stage: &StageReport, takeaways: Option<&KeyTakeaways>, color: bool) -> String {
    let output = &stage.output;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        paint(&format!("── {} ({}) ──", output.title, output.agent), BOLD, color)
    );

    match &output.status {
        StageStatus::Completed => {
            if let Some(line) = takeaways.and_then(|t| stage_takeaway(&output.stage_id, t)) {
                let _ = writeln!(out, "▶ {line}");
            }
            match &stage.json {
                Some(json) => {
                    let pretty = serde_json::to_string_pretty(json).unwrap_or_else(|_| output.text.clone());
                    let _ = writeln!(out, "{pretty}");
                }
                None => {
                    let _ = writeln!(out, "{}", output.text.trim());
                }
            }
            if output.truncated {
                let _ = writeln!(out, "(stopped at the iteration limit; answer may be incomplete)");
            }
        }
        StageStatus::Failed { message } => {
            let _ = writeln!(out, "{}", error_banner(&format!("{} failed: {message}", output.title), color));
        }
        StageStatus::Skipped { reason } => {
            let _ = writeln!(out, "{}", error_banner(&format!("{} skipped: {reason}", output.title), color));
        }
    }
    out
}

fn usage_table(report: &AnalysisReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Stage", "Input tokens", "Output tokens", "Tool calls", "Time (s)"]);
    for stage in &report.stages {
        let o = &stage.output;
        table.add_row(vec![
            o.title.clone(),
            o.usage.input_tokens.to_string(),
            o.usage.output_tokens.to_string(),
            o.tool_calls.to_string(),
            format!("{:.1}", o.duration_ms as f64 / 1000.0),
        ]);
    }
    table.add_row(vec![
        "Total".to_string(),
        report.total_usage.input_tokens.to_string(),
        report.total_usage.output_tokens.to_string(),
        report.stages.iter().map(|s| s.output.tool_calls).sum::<usize>().to_string(),
        format!("{:.1}", report.duration_ms as f64 / 1000.0),
    ]);
    table
}

/// Full text report
pub fn report(report: &AnalysisReport, color: bool) -> String {
    let mut out = String::new();
    let title = match report.snapshot.as_ref().and_then(|s| s.name.as_deref()) {
        Some(name) => format!("{} · {name}", report.ticker),
        None => report.ticker.to_string(),
    };
    let _ = writeln!(out, "{}", paint(&format!("═══ Stock Analysis: {title} ═══"), BOLD, color));
    let _ = writeln!(
        out,
        "{} · run {}\n",
        report.started_at.format("%Y-%m-%d %H:%M UTC"),
        report.run_id
    );

    if let Some(snapshot) = &report.snapshot {
        snapshot_section(&mut out, snapshot);
        out.push('\n');
    } else if let Some(error) = &report.snapshot_error {
        let _ = writeln!(out, "{}\n", error_banner(&format!("market snapshot unavailable: {error}"), color));
    }

    if !report.key_takeaways.is_empty() {
        let _ = writeln!(out, "{}\n", takeaways_table(&report.key_takeaways));
    }

    for stage in &report.stages {
        out.push_str(&stage_section(stage, Some(&report.key_takeaways), color));
        out.push('\n');
    }

    let _ = writeln!(out, "Token usage\n{}", usage_table(report));
    out
}

/// Stage list for `market-crew stages`
pub fn stages_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Stage", "Role", "Tools", "Reads"]);
    for role in &ROLES {
        let tools: Vec<&str> = role.tools.iter().map(|t| t.name()).collect();
        table.add_row(vec![
            role.stage_id.to_string(),
            role.role.to_string(),
            tools.join(", "),
            if role.depends_on.is_empty() {
                "-".to_string()
            } else {
                role.depends_on.join(", ")
            },
        ]);
    }
    table
}
