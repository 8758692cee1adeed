//! Technical indicator summary computed from closing prices

use serde::{Deserialize, Serialize};
use ta::Next;
use ta::indicators::{
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};

use crate::error::{MarketError, Result};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const SMA_SHORT: usize = 50;
pub const SMA_LONG: usize = 200;

/// Last MACD reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// RSI-14, MACD 12/26/9 and the 50/200-day SMAs at the last close
///
/// An indicator is `None` until the history is long enough for it to have
/// warmed up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSummary {
    pub rsi_14: Option<f64>,
    pub rsi_signal: Option<String>,
    pub macd: Option<MacdReading>,
    pub macd_trend: Option<String>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub price_vs_sma_50: Option<String>,
    pub price_vs_sma_200: Option<String>,
}

impl TechnicalSummary {
    /// Compute the summary from closes, oldest first
    pub fn from_closes(closes: &[f64]) -> Result<Self> {
        let last = closes.last().copied();

        let rsi_14 = if closes.len() > RSI_PERIOD {
            let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).map_err(indicator_error)?;
            closes.iter().fold(None, |_, &c| Some(rsi.next(c)))
        } else {
            None
        };

        let macd = if closes.len() >= MACD_SLOW + MACD_SIGNAL {
            let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
                .map_err(indicator_error)?;
            closes.iter().fold(None, |_, &c| Some(macd.next(c))).map(|o| MacdReading {
                macd: o.macd,
                signal: o.signal,
                histogram: o.histogram,
            })
        } else {
            None
        };

        let sma_50 = sma(closes, SMA_SHORT)?;
        let sma_200 = sma(closes, SMA_LONG)?;

        Ok(Self {
            rsi_signal: rsi_14.map(|v| interpret_rsi(v).to_string()),
            rsi_14,
            macd_trend: macd.map(|m| interpret_macd(&m).to_string()),
            macd,
            price_vs_sma_50: relative_position(last, sma_50),
            price_vs_sma_200: relative_position(last, sma_200),
            sma_50,
            sma_200,
        })
    }
}

fn sma(closes: &[f64], period: usize) -> Result<Option<f64>> {
    if closes.len() < period {
        return Ok(None);
    }
    let mut sma = SimpleMovingAverage::new(period).map_err(indicator_error)?;
    Ok(closes.iter().fold(None, |_, &c| Some(sma.next(c))))
}

fn indicator_error(err: ta::errors::TaError) -> MarketError {
    MarketError::IndicatorError(err.to_string())
}

fn relative_position(price: Option<f64>, average: Option<f64>) -> Option<String> {
    let (price, average) = (price?, average?);
    Some(if price >= average { "above" } else { "below" }.to_string())
}

/// Interpret RSI value
pub fn interpret_rsi(rsi: f64) -> &'static str {
    if rsi > 70.0 {
        "Overbought - potential sell signal"
    } else if rsi < 30.0 {
        "Oversold - potential buy signal"
    } else {
        "Neutral"
    }
}

fn interpret_macd(reading: &MacdReading) -> &'static str {
    if reading.histogram > 0.0 {
        "Bullish - MACD above signal line"
    } else if reading.histogram < 0.0 {
        "Bearish - MACD below signal line"
    } else {
        "Neutral"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_interpret_rsi() {
        assert_eq!(interpret_rsi(75.0), "Overbought - potential sell signal");
        assert_eq!(interpret_rsi(25.0), "Oversold - potential buy signal");
        assert_eq!(interpret_rsi(50.0), "Neutral");
    }

    #[test]
    fn test_short_history_leaves_indicators_unset() {
        let summary = TechnicalSummary::from_closes(&rising(10)).unwrap();
        assert!(summary.rsi_14.is_none());
        assert!(summary.macd.is_none());
        assert!(summary.sma_50.is_none());
        assert!(summary.price_vs_sma_200.is_none());

        let empty = TechnicalSummary::from_closes(&[]).unwrap();
        assert!(empty.rsi_signal.is_none());
    }

    #[test]
    fn test_rising_series() {
        let summary = TechnicalSummary::from_closes(&rising(250)).unwrap();

        let rsi = summary.rsi_14.unwrap();
        assert!(rsi > 70.0, "rsi {rsi}");
        assert_eq!(summary.rsi_signal.as_deref(), Some("Overbought - potential sell signal"));

        // Mean of the last 50 closes: 100 + (200..250).mean()
        let sma_50 = summary.sma_50.unwrap();
        assert!((sma_50 - 324.5).abs() < 1e-6, "sma_50 {sma_50}");
        assert_eq!(summary.price_vs_sma_50.as_deref(), Some("above"));
        assert_eq!(summary.price_vs_sma_200.as_deref(), Some("above"));

        assert!(summary.macd.unwrap().macd > 0.0);
    }
}
