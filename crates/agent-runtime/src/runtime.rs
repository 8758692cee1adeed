//! Runtime holding the resources shared by every agent
//!
//! One provider and one retry policy serve all agents of a run; each agent
//! gets its own tool registry.

use agent_core::{Error, Result};
use agent_llm::LLMProvider;
use agent_tools::ToolRegistry;
use agent_utils::{LlmSettings, RetryPolicy};
use std::sync::Arc;
use tracing::debug;

use crate::agents::ToolAgent;
use crate::executor::{AgentExecutor, ExecutorConfig};

/// Defaults applied to agents created by the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub default_max_iterations: usize,
    pub default_model: String,
    pub default_max_tokens: usize,
    pub default_temperature: Option<f32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let executor = ExecutorConfig::default();
        Self {
            default_max_iterations: executor.max_iterations,
            default_model: executor.model,
            default_max_tokens: executor.max_tokens,
            default_temperature: executor.temperature,
        }
    }
}

impl RuntimeConfig {
    /// Defaults taken from the LLM settings
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            default_model: settings.model.clone(),
            default_max_tokens: settings.max_tokens as usize,
            default_temperature: Some(settings.temperature),
            ..Self::default()
        }
    }
}

/// Shared provider, retry policy and agent defaults
///
/// ```no_run
/// use agent_runtime::AgentRuntime;
/// use agent_tools::ToolRegistry;
/// use agent_utils::Config;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_env()?;
/// let runtime = AgentRuntime::builder()
///     .provider(agent_llm::providers::from_settings(&config.llm)?)
///     .settings(&config.llm)
///     .retry_policy(config.retry.clone())
///     .build()?;
///
/// let agent = runtime.create_tool_agent(
///     runtime.executor_config("You are a market research analyst."),
///     "Market Research Analyst",
///     Arc::new(ToolRegistry::new()),
/// );
/// # Ok(())
/// # }
/// ```
pub struct AgentRuntime {
    provider: Arc<dyn LLMProvider>,
    retry: RetryPolicy,
    config: RuntimeConfig,
}

impl AgentRuntime {
    pub fn new(provider: Arc<dyn LLMProvider>, retry: RetryPolicy, config: RuntimeConfig) -> Self {
        Self {
            provider,
            retry,
            config,
        }
    }

    pub fn builder() -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new()
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Executor settings from the runtime defaults plus a system prompt
    pub fn executor_config(&self, system_prompt: impl Into<String>) -> ExecutorConfig {
        ExecutorConfig {
            max_iterations: self.config.default_max_iterations,
            model: self.config.default_model.clone(),
            system_prompt: Some(system_prompt.into()),
            max_tokens: self.config.default_max_tokens,
            temperature: self.config.default_temperature,
        }
    }

    /// Create a tool-using agent bound to `tools`
    pub fn create_tool_agent(
        &self,
        config: ExecutorConfig,
        name: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> ToolAgent {
        let name = name.into();
        debug!(agent = %name, tools = ?tools.names(), model = %config.model, "Creating tool agent");
        let executor = AgentExecutor::new(Arc::clone(&self.provider), tools, config)
            .with_retry_policy(self.retry.clone());
        ToolAgent::new(executor, name)
    }
}

/// Builder for AgentRuntime
#[derive(Default)]
pub struct AgentRuntimeBuilder {
    provider: Option<Arc<dyn LLMProvider>>,
    retry: RetryPolicy,
    config: RuntimeConfig,
}

impl AgentRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Take model, token and temperature defaults from `settings`
    pub fn settings(mut self, settings: &LlmSettings) -> Self {
        let max_iterations = self.config.default_max_iterations;
        self.config = RuntimeConfig {
            default_max_iterations: max_iterations,
            ..RuntimeConfig::from_settings(settings)
        };
        self
    }

    pub fn default_max_iterations(mut self, max: usize) -> Self {
        self.config.default_max_iterations = max;
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn build(self) -> Result<AgentRuntime> {
        let provider = self
            .provider
            .ok_or_else(|| Error::InitializationFailed("Provider not set".to_string()))?;
        self.retry.validate().map_err(Error::Configuration)?;
        if self.config.default_max_iterations == 0 {
            return Err(Error::Configuration(
                "default_max_iterations must be greater than 0".to_string(),
            ));
        }

        Ok(AgentRuntime::new(provider, self.retry, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, reply};
    use agent_core::{Agent, Context};

    #[test]
    fn test_builder_applies_settings() {
        let settings = LlmSettings {
            model: "gemini-2.0-flash".into(),
            max_tokens: 2048,
            temperature: 0.2,
            ..LlmSettings::default()
        };
        let runtime = AgentRuntime::builder()
            .provider(ScriptedProvider::new(vec![]))
            .default_max_iterations(4)
            .settings(&settings)
            .build()
            .unwrap();

        let config = runtime.executor_config("prompt");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.system_prompt.as_deref(), Some("prompt"));
    }

    #[test]
    fn test_builder_validation() {
        assert!(AgentRuntime::builder().build().is_err());

        let bad_retry = AgentRuntime::builder()
            .provider(ScriptedProvider::new(vec![]))
            .retry_policy(RetryPolicy::default().with_max_attempts(0))
            .build();
        assert!(matches!(bad_retry, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_agents_share_provider() {
        let provider = ScriptedProvider::new(vec![Ok(reply("a", 1, 1)), Ok(reply("b", 1, 1))]);
        let runtime = AgentRuntime::builder()
            .provider(provider.clone())
            .build()
            .unwrap();

        let first = runtime.create_tool_agent(
            runtime.executor_config("one"),
            "first",
            Arc::new(ToolRegistry::new()),
        );
        let second = runtime.create_tool_agent(
            runtime.executor_config("two"),
            "second",
            Arc::new(ToolRegistry::new()),
        );

        let mut ctx = Context::new();
        assert_eq!(first.process("x".into(), &mut ctx).await.unwrap(), "a");
        assert_eq!(second.process("y".into(), &mut ctx).await.unwrap(), "b");

        let systems: Vec<_> = provider
            .requests()
            .into_iter()
            .filter_map(|r| r.system)
            .collect();
        assert_eq!(systems, vec!["one", "two"]);
    }
}
