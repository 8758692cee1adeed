//! Financial ratios and price-history statistics
//!
//! All functions are total: a missing operand, a zero denominator or a
//! non-finite result yields `None` instead of a misleading number.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::api::PriceBar;

/// `numerator / denominator`, if both are present and the result is finite
pub fn safe_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    Some(n / d).filter(|r| r.is_finite())
}

/// Gross profit over revenue, as a fraction
pub fn gross_margin(gross_profit: Option<f64>, revenue: Option<f64>) -> Option<f64> {
    safe_ratio(gross_profit, revenue)
}

pub fn current_ratio(current_assets: Option<f64>, current_liabilities: Option<f64>) -> Option<f64> {
    safe_ratio(current_assets, current_liabilities)
}

/// Current assets less inventory over current liabilities
///
/// Companies without reported inventory are treated as holding none.
pub fn quick_ratio(
    current_assets: Option<f64>,
    inventory: Option<f64>,
    current_liabilities: Option<f64>,
) -> Option<f64> {
    let liquid = current_assets? - inventory.unwrap_or(0.0);
    safe_ratio(Some(liquid), current_liabilities)
}

/// Total debt over shareholder equity; undefined for non-positive equity
pub fn debt_to_equity(total_debt: Option<f64>, equity: Option<f64>) -> Option<f64> {
    if equity? <= 0.0 {
        return None;
    }
    safe_ratio(total_debt, equity)
}

/// Change from `from` to `to` in percent
pub fn percent_change(from: f64, to: f64) -> Option<f64> {
    safe_ratio(Some(to - from), Some(from)).map(|r| r * 100.0)
}

/// Growth from `previous` to `current` as a fraction
///
/// Uses the magnitude of `previous` so that a move from a loss to a smaller
/// loss reads as positive growth.
pub fn growth_rate(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    let previous = previous?;
    safe_ratio(Some(current? - previous), Some(previous.abs()))
}

/// Statistics over a daily price history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub last_close: f64,
    pub last_month_low: f64,
    pub last_month_high: f64,
    pub last_month_avg_volume: f64,
    pub week_52_low: f64,
    pub week_52_high: f64,
    /// Percent change from the first to the last close
    pub period_change_pct: Option<f64>,
}

impl HistorySummary {
    /// Summarise `bars` (oldest first); `None` for an empty history
    ///
    /// "Last month" and "52 weeks" are measured back from the newest bar,
    /// not from the wall clock.
    pub fn from_bars(bars: &[PriceBar]) -> Option<Self> {
        let first = bars.first()?;
        let last = bars.last()?;

        let month_start = last.timestamp - Duration::days(30);
        let year_start = last.timestamp - Duration::days(365);
        let last_month: Vec<&PriceBar> =
            bars.iter().filter(|b| b.timestamp >= month_start).collect();
        let last_year = bars.iter().filter(|b| b.timestamp >= year_start);

        let (last_month_low, last_month_high) = low_high(last_month.iter().copied())?;
        let (week_52_low, week_52_high) = low_high(last_year)?;
        let last_month_avg_volume =
            last_month.iter().map(|b| b.volume as f64).sum::<f64>() / last_month.len() as f64;

        Some(Self {
            last_close: last.close,
            last_month_low,
            last_month_high,
            last_month_avg_volume,
            week_52_low,
            week_52_high,
            period_change_pct: percent_change(first.close, last.close),
        })
    }
}

fn low_high<'a>(bars: impl Iterator<Item = &'a PriceBar>) -> Option<(f64, f64)> {
    bars.fold(None, |acc, bar| match acc {
        None => Some((bar.low, bar.high)),
        Some((low, high)) => Some((low.min(bar.low), high.max(bar.high))),
    })
}
