//! Concrete LLM provider implementations

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIProvider};

use crate::{LLMError, LLMProvider, Result};
use agent_utils::{LlmSettings, ProviderKind};
use std::sync::Arc;

/// Build the provider selected by `settings`
///
/// Fails with a configuration error when the credential is missing or the
/// backend was compiled out.
pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn LLMProvider>> {
    let api_key = settings
        .require_api_key()
        .map_err(|e| LLMError::ConfigurationError(e.to_string()))?;

    match settings.provider {
        #[cfg(feature = "openai")]
        ProviderKind::Gemini | ProviderKind::OpenAI => {
            let config = OpenAIConfig::new(api_key)
                .with_api_base(settings.api_base_or_default())
                .with_timeout(settings.timeout_secs)
                .with_provider_name(settings.provider.to_string());
            Ok(Arc::new(OpenAIProvider::with_config(config)?))
        }
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::with_options(
            api_key,
            settings.api_base_or_default(),
            settings.timeout(),
        )?)),
        #[allow(unreachable_patterns)]
        other => Err(LLMError::ConfigurationError(format!(
            "provider {other} is not enabled in this build"
        ))),
    }
}
