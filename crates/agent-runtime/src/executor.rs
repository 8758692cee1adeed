//! Agent executor for running agent loops
//!
//! The AgentExecutor implements the tool-use loop:
//! 1. Call the LLM (through the retry policy) with the conversation and tools
//! 2. If tools were requested, run them and append their results
//! 3. Repeat until the model ends its turn or the iteration bound is hit

use agent_core::{Error, Result};
use agent_llm::{
    CompletionRequest, CompletionResponse, ContentBlock, LLMProvider, Message, StopReason,
    TokenUsage,
};
use agent_tools::ToolRegistry;
use agent_utils::RetryPolicy;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 300;

/// Configuration for agent execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on LLM round trips for one run
    pub max_iterations: usize,

    pub model: String,

    pub system_prompt: Option<String>,

    /// Max tokens per completion
    pub max_tokens: usize,

    pub temperature: Option<f32>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            model: "gemini-1.5-pro-latest".to_string(),
            system_prompt: None,
            max_tokens: 4096,
            temperature: Some(0.7),
        }
    }
}

/// Result of one executor run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Final assistant text
    pub text: String,
    /// Usage summed over every completion in the run
    pub usage: TokenUsage,
    /// LLM round trips made
    pub iterations: usize,
    /// Tool invocations made, failed ones included
    pub tool_calls: usize,
    /// The last completion stopped at the token limit
    pub truncated: bool,
}

/// Executes an agent loop: LLM → tool calls → execution → loop back
pub struct AgentExecutor {
    provider: Arc<dyn LLMProvider>,
    tool_registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
    retry: RetryPolicy,
}

impl AgentExecutor {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tool_registry: Arc<ToolRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            tool_registry,
            config,
            retry: RetryPolicy::default(),
        }
    }

    /// Policy applied to every completion call
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }

    /// Run the loop for a single user message
    pub async fn run(&self, user_message: String) -> Result<ExecutionOutcome> {
        self.run_conversation(vec![Message::user(user_message)]).await
    }

    /// Run the loop continuing an existing conversation
    pub async fn run_with_history(
        &self,
        user_message: String,
        history: Vec<Message>,
    ) -> Result<ExecutionOutcome> {
        let mut conversation = history;
        conversation.push(Message::user(user_message));
        self.run_conversation(conversation).await
    }

    async fn run_conversation(&self, mut conversation: Vec<Message>) -> Result<ExecutionOutcome> {
        let tools = self.tool_registry.definitions();
        let mut usage = TokenUsage::default();
        let mut tool_calls = 0;

        for iteration in 1..=self.config.max_iterations {
            debug!(
                iteration,
                max_iterations = self.config.max_iterations,
                messages = conversation.len(),
                "Agent iteration started"
            );

            let mut builder = CompletionRequest::builder(&self.config.model)
                .messages(conversation.clone())
                .max_tokens(self.config.max_tokens)
                .tools(tools.clone());
            if let Some(system) = &self.config.system_prompt {
                builder = builder.system(system.clone());
            }
            if let Some(temperature) = self.config.temperature {
                builder = builder.temperature(temperature);
            }

            let response = self.complete(builder.build()).await?;
            usage += response.usage;

            info!(
                iteration,
                stop_reason = ?response.stop_reason,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "LLM response received"
            );

            let text = response.text();
            debug!(preview = %preview(&text), "LLM response content");

            let requested = response.message.has_tool_uses();
            conversation.push(response.message.clone());

            match response.stop_reason {
                StopReason::ToolUse if requested => {
                    let results = self.execute_tools(&response.message).await;
                    tool_calls += results.len();
                    conversation.push(Message::tool_results(results));
                }
                StopReason::MaxTokens => {
                    warn!(iteration, "Response truncated at the token limit");
                    return Ok(ExecutionOutcome {
                        text,
                        usage,
                        iterations: iteration,
                        tool_calls,
                        truncated: true,
                    });
                }
                StopReason::ToolUse | StopReason::EndTurn | StopReason::StopSequence => {
                    return Ok(ExecutionOutcome {
                        text,
                        usage,
                        iterations: iteration,
                        tool_calls,
                        truncated: false,
                    });
                }
            }
        }

        warn!(
            max_iterations = self.config.max_iterations,
            tool_calls, "Max iterations reached without a final answer"
        );
        Err(Error::ProcessingFailed(format!(
            "no final answer after {} iterations ({tool_calls} tool calls)",
            self.config.max_iterations
        )))
    }

    /// One completion call under the retry policy
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let service = format!("llm:{}", self.provider.name());
        self.retry
            .execute(&service, || self.provider.complete(request.clone()))
            .await
            .map_err(|e| Error::external(service.as_str(), e.attempts, e.source.to_string()))
    }

    /// Run every tool call of an assistant turn, in request order
    ///
    /// Failures, including unknown tool names, become error results for the
    /// model instead of aborting the run.
    async fn execute_tools(&self, message: &Message) -> Vec<ContentBlock> {
        let mut results = Vec::new();

        for block in message.tool_uses() {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };
            results.push(self.execute_tool(id, name, input).await);
        }

        results
    }

    async fn execute_tool(&self, id: &str, name: &str, input: &Value) -> ContentBlock {
        let Some(tool) = self.tool_registry.get(name) else {
            warn!(tool = %name, "Model requested an unknown tool");
            return ContentBlock::tool_error(
                id,
                format!(
                    "Unknown tool '{name}'. Available tools: {}",
                    self.tool_registry.names().join(", ")
                ),
            );
        };

        info!(tool = %name, tool_id = %id, input = %preview(&input.to_string()), "Executing tool");
        let started = Instant::now();

        match tool.execute(input.clone()).await {
            Ok(output) => {
                let body = output.to_string();
                info!(
                    tool = %name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    result_length = body.len(),
                    "Tool execution succeeded"
                );
                ContentBlock::tool_result(id, body)
            }
            Err(e) => {
                warn!(
                    tool = %name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Tool execution failed"
                );
                ContentBlock::tool_error(id, format!("Error: {e}"))
            }
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Builder for AgentExecutor
#[derive(Default)]
pub struct AgentExecutorBuilder {
    provider: Option<Arc<dyn LLMProvider>>,
    tool_registry: Option<Arc<ToolRegistry>>,
    config: ExecutorConfig,
    retry: RetryPolicy,
}

impl AgentExecutorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tool_registry = Some(registry);
        self
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn build(self) -> Result<AgentExecutor> {
        let provider = self
            .provider
            .ok_or_else(|| Error::InitializationFailed("Provider not set".to_string()))?;
        if self.config.max_iterations == 0 {
            return Err(Error::Configuration(
                "max_iterations must be greater than 0".to_string(),
            ));
        }

        Ok(AgentExecutor::new(
            provider,
            self.tool_registry.unwrap_or_default(),
            self.config,
        )
        .with_retry_policy(self.retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, reply, tool_call};
    use agent_llm::LLMError;
    use agent_tools::Tool;
    use async_trait::async_trait;
    use serde_json::json;

    struct Quote;

    #[async_trait]
    impl Tool for Quote {
        async fn execute(&self, params: Value) -> Result<Value> {
            match params["ticker"].as_str() {
                Some("AAPL") => Ok(json!({ "ticker": "AAPL", "price": 190.5 })),
                other => Err(Error::ProcessingFailed(format!("unknown ticker {other:?}"))),
            }
        }

        fn name(&self) -> &str {
            "stock_data"
        }

        fn description(&self) -> &str {
            "Quote lookup"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
    }

    fn executor(provider: Arc<ScriptedProvider>) -> AgentExecutor {
        AgentExecutorBuilder::new()
            .provider(provider)
            .tool_registry(Arc::new(ToolRegistry::with_tools([
                Arc::new(Quote) as Arc<dyn Tool>
            ])))
            .system_prompt("You are a market analyst")
            .retry_policy(RetryPolicy::fast())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let provider = ScriptedProvider::new(vec![Ok(reply("Bullish.", 10, 3))]);
        let outcome = executor(provider.clone()).run("Analyze AAPL".into()).await.unwrap();

        assert_eq!(outcome.text, "Bullish.");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(outcome.usage, TokenUsage::new(10, 3));

        let requests = provider.requests();
        assert_eq!(requests[0].system.as_deref(), Some("You are a market analyst"));
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_tool_loop_accumulates_usage() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("c1", "stock_data", json!({ "ticker": "AAPL" }), 20, 5)),
            Ok(reply("Price is 190.5", 30, 8)),
        ]);
        let outcome = executor(provider.clone()).run("Price?".into()).await.unwrap();

        assert_eq!(outcome.text, "Price is 190.5");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.usage, TokenUsage::new(50, 13));

        // user, assistant(tool_use), user(tool_result)
        let second = &provider.requests()[1];
        assert_eq!(second.messages.len(), 3);
        let results = second.messages[2].clone();
        assert!(results.joined_text().is_empty());
        assert!(format!("{:?}", results.content).contains("190.5"));
    }

    #[tokio::test]
    async fn test_tool_failure_returned_to_model() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("c1", "stock_data", json!({ "ticker": "ZZZZ" }), 1, 1)),
            Ok(tool_call("c2", "no_such_tool", json!({}), 1, 1)),
            Ok(reply("Ticker could not be found.", 1, 1)),
        ]);
        let outcome = executor(provider.clone()).run("ZZZZ".into()).await.unwrap();

        assert_eq!(outcome.tool_calls, 2);
        let requests = provider.requests();
        let Some(agent_llm::MessageContent::Blocks(blocks)) = &requests[1].messages[2].content
        else {
            panic!("expected tool result blocks");
        };
        assert!(blocks[0].is_error_result());

        let Some(agent_llm::MessageContent::Blocks(blocks)) = &requests[2].messages[4].content
        else {
            panic!("expected tool result blocks");
        };
        assert!(blocks[0].is_error_result());
        assert!(format!("{blocks:?}").contains("Unknown tool 'no_such_tool'"));
    }

    #[tokio::test]
    async fn test_transient_llm_errors_are_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(LLMError::RateLimitExceeded("slow down".into())),
            Ok(reply("Done.", 1, 1)),
        ]);
        let outcome = executor(provider.clone()).run("x".into()).await.unwrap();
        assert_eq!(outcome.text, "Done.");
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_external_error() {
        let provider = ScriptedProvider::new(vec![
            Err(LLMError::RequestFailed("HTTP 503".into())),
            Err(LLMError::RequestFailed("HTTP 503".into())),
            Err(LLMError::RequestFailed("HTTP 503".into())),
        ]);
        let err = executor(provider.clone()).run("x".into()).await.unwrap_err();

        match err {
            Error::ExternalCall { service, attempts, .. } => {
                assert_eq!(service, "llm:scripted");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(LLMError::AuthenticationFailed)]);
        let err = executor(provider.clone()).run("x".into()).await.unwrap_err();
        assert!(matches!(err, Error::ExternalCall { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_truncated_answer_flagged() {
        let mut truncated = reply("Partial analy", 5, 4096);
        truncated.stop_reason = StopReason::MaxTokens;
        let provider = ScriptedProvider::new(vec![Ok(truncated)]);
        let outcome = executor(provider).run("x".into()).await.unwrap();
        assert!(outcome.truncated);
        assert_eq!(outcome.text, "Partial analy");
    }

    #[tokio::test]
    async fn test_iteration_bound() {
        let script = (0..3)
            .map(|i| Ok(tool_call(&format!("c{i}"), "stock_data", json!({ "ticker": "AAPL" }), 1, 1)))
            .collect();
        let provider = ScriptedProvider::new(script);
        let exec = AgentExecutorBuilder::new()
            .provider(provider.clone())
            .tool_registry(Arc::new(ToolRegistry::with_tools([
                Arc::new(Quote) as Arc<dyn Tool>
            ])))
            .max_iterations(3)
            .build()
            .unwrap();

        let err = exec.run("loop".into()).await.unwrap_err();
        assert!(err.to_string().contains("no final answer after 3 iterations"));
        assert_eq!(provider.requests().len(), 3);
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(AgentExecutorBuilder::new().build().is_err());
    }
}
