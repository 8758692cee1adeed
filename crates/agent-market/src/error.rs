//! Error types for market data and analysis operations

use agent_utils::{RetryError, Retryable};
use thiserror::Error;

/// Market analysis specific errors
#[derive(Debug, Error)]
pub enum MarketError {
    /// Ticker is malformed or unknown to the data provider
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Tool arguments the model got wrong
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Data not available for the requested symbol
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Provider throttled the request
    #[error("Rate limit exceeded for {provider}")]
    RateLimitExceeded { provider: String },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Non-success HTTP status from a provider
    #[error("{provider} returned HTTP {status}")]
    HttpStatus { provider: String, status: u16 },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Yahoo Finance API error
    #[error("Yahoo Finance error: {0}")]
    YahooFinanceError(String),

    /// Payload did not have the expected shape
    #[error("Unexpected {provider} response: {reason}")]
    Parse { provider: String, reason: String },

    /// Technical indicator calculation error
    #[error("Technical indicator error: {0}")]
    IndicatorError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Prompt template failed to render
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Crew could not be assembled
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] agent_workflow::PipelineError),

    /// A retried operation gave up
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<MarketError>,
    },

    /// Error raised by the agent layer
    #[error(transparent)]
    Agent(#[from] agent_core::Error),
}

/// Result type alias for market operations
pub type Result<T> = std::result::Result<T, MarketError>;

impl MarketError {
    /// Collapse the outcome of [`agent_utils::RetryPolicy::execute`]
    ///
    /// A single failed attempt keeps its own error so that permanent failures
    /// (bad symbol, missing key) read naturally.
    pub fn from_retry(operation: impl Into<String>, err: RetryError<MarketError>) -> Self {
        if err.attempts <= 1 {
            return err.source;
        }
        Self::RetriesExhausted {
            operation: operation.into(),
            attempts: err.attempts,
            source: Box::new(err.source),
        }
    }

    /// Number of attempts behind this error
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

impl Retryable for MarketError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError(_)
            | Self::RateLimitExceeded { .. }
            | Self::YahooFinanceError(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Convert MarketError to agent_core::Error
impl From<MarketError> for agent_core::Error {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::Agent(inner) => inner,
            MarketError::ConfigError(msg) => agent_core::Error::Configuration(msg),
            MarketError::RetriesExhausted {
                operation,
                attempts,
                source,
            } => agent_core::Error::external(operation, attempts, source.to_string()),
            other => agent_core::Error::ProcessingFailed(other.to_string()),
        }
    }
}
