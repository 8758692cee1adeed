//! Ticker symbol normalisation

use crate::error::{MarketError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted symbol
pub const MAX_TICKER_LEN: usize = 10;

/// Upper-cased, validated ticker symbol
///
/// Accepts 1 to 10 characters from `A-Z 0-9 . ^ = -` after trimming and
/// upper-casing, which covers share classes (`BRK.B`), indices (`^GSPC`),
/// futures and currencies (`CL=F`, `EURUSD=X`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self> {
        let symbol = raw.trim().to_ascii_uppercase();

        if symbol.is_empty() {
            return Err(MarketError::InvalidSymbol(
                "ticker must not be empty".to_string(),
            ));
        }
        if symbol.len() > MAX_TICKER_LEN {
            return Err(MarketError::InvalidSymbol(format!(
                "{symbol} is longer than {MAX_TICKER_LEN} characters"
            )));
        }
        if let Some(bad) = symbol
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '=' | '-')))
        {
            return Err(MarketError::InvalidSymbol(format!(
                "{symbol} contains '{bad}'"
            )));
        }

        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = MarketError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
