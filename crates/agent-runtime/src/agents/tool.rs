//! Tool agent implementation (wraps AgentExecutor)

use crate::executor::{AgentExecutor, ExecutionOutcome};
use agent_core::context::keys;
use agent_core::{Agent, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;

/// An [`Agent`] backed by the LLM tool loop
///
/// After each run the agent writes its bookkeeping into the [`Context`]:
/// token usage, tool call count, iterations and the truncation flag.
pub struct ToolAgent {
    executor: AgentExecutor,
    name: String,
}

impl ToolAgent {
    pub fn new(executor: AgentExecutor, name: impl Into<String>) -> Self {
        Self {
            executor,
            name: name.into(),
        }
    }

    pub fn executor(&self) -> &AgentExecutor {
        &self.executor
    }

    /// Run and return the full outcome instead of only the text
    pub async fn run(&self, input: String) -> Result<ExecutionOutcome> {
        self.executor.run(input).await
    }
}

fn record(context: &mut Context, outcome: &ExecutionOutcome) -> Result<()> {
    context.insert_typed(keys::TOKEN_USAGE, &outcome.usage)?;
    context.insert(keys::TOOL_CALLS, json!(outcome.tool_calls));
    context.insert(keys::ITERATIONS, json!(outcome.iterations));
    context.insert(keys::TRUNCATED, json!(outcome.truncated));
    Ok(())
}

#[async_trait]
impl Agent for ToolAgent {
    #[instrument(skip(self, input, context), fields(agent = %self.name))]
    async fn process(&self, input: String, context: &mut Context) -> Result<String> {
        let outcome = self.executor.run(input).await?;
        record(context, &outcome)?;
        Ok(outcome.text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::AgentExecutorBuilder;
    use crate::testing::{ScriptedProvider, reply};
    use agent_llm::TokenUsage;

    #[tokio::test]
    async fn test_process_records_bookkeeping() {
        let provider = ScriptedProvider::new(vec![Ok(reply("{\"ok\": true}", 40, 12))]);
        let executor = AgentExecutorBuilder::new().provider(provider).build().unwrap();
        let agent = ToolAgent::new(executor, "Market Research Analyst");

        let mut context = Context::new().with_stage("market");
        let text = agent.process("Analyze NVDA".into(), &mut context).await.unwrap();

        assert_eq!(text, "{\"ok\": true}");
        assert_eq!(agent.name(), "Market Research Analyst");
        let usage: TokenUsage = context.get_typed(keys::TOKEN_USAGE).unwrap().unwrap();
        assert_eq!(usage.total(), 52);
        assert_eq!(context.tool_calls(), 0);
        assert!(!context.truncated());
        assert_eq!(context.stage(), Some("market"));
    }
}
