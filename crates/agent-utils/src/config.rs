//! Configuration management utilities
//!
//! Settings come from process environment variables. A `.env` file in the
//! working directory is loaded first when present.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable present but unparseable
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Required credential absent
    #[error("missing {key}; set it in the environment or a .env file")]
    MissingKey { key: String },

    /// Settings parsed but inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAI,
    Anthropic,
}

impl ProviderKind {
    /// Model used when `LLM_MODEL` is unset
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-1.5-pro-latest",
            ProviderKind::OpenAI => "gpt-4o",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
        }
    }

    /// Environment variable holding the credential
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Base URL used when `LLM_API_BASE` is unset
    pub fn default_api_base(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
        };
        f.write_str(name)
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: other.to_string(),
                reason: "expected gemini, openai or anthropic".to_string(),
            }),
        }
    }
}

/// Settings for the language model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub model: String,
    /// Never serialized
    #[serde(skip)]
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let provider = ProviderKind::default();
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: None,
            api_base: None,
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

impl LlmSettings {
    /// Base URL, falling back to the provider default
    pub fn api_base_or_default(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_base())
    }

    /// Credential, or a `MissingKey` error naming the variable to set
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: self.provider.api_key_env().to_string(),
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    pub llm: LlmSettings,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "market-crew".to_string(),
            environment: "development".to_string(),
            llm: LlmSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load from the process environment (and `.env`, if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => ProviderKind::default(),
        };

        let defaults = Config::default();
        let llm = LlmSettings {
            provider,
            model: get("LLM_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            api_key: get(provider.api_key_env()),
            api_base: get("LLM_API_BASE"),
            temperature: parse_var(&get, "LLM_TEMPERATURE")?.unwrap_or(defaults.llm.temperature),
            max_tokens: parse_var(&get, "LLM_MAX_TOKENS")?.unwrap_or(defaults.llm.max_tokens),
            timeout_secs: parse_var(&get, "LLM_TIMEOUT_SECS")?
                .unwrap_or(defaults.llm.timeout_secs),
        };
        llm.validate()?;

        let mut retry = defaults.retry;
        if let Some(attempts) = parse_var(&get, "RETRY_MAX_ATTEMPTS")? {
            retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64, _>(&get, "RETRY_INITIAL_BACKOFF_MS")? {
            retry.initial_backoff = Duration::from_millis(ms);
            retry.max_backoff = retry.max_backoff.max(retry.initial_backoff);
        }
        retry.validate().map_err(ConfigError::Invalid)?;

        Ok(Self {
            app_name: defaults.app_name,
            environment: get("APP_ENV").unwrap_or(defaults.environment),
            llm,
            retry,
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
