//! Shared utilities for the market analysis crew
//!
//! This crate provides common functionality used across the workspace:
//! tracing setup, environment-driven configuration, and the retry policy
//! applied to every external call (LLM, market data, web search).

pub mod config;
pub mod logging;
pub mod retry;

pub use config::{Config, ConfigError, LlmSettings, ProviderKind};
pub use logging::init_tracing;
pub use retry::{RetryError, RetryPolicy, Retryable};
