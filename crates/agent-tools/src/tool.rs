//! Tool trait definition

use agent_core::Result;
use agent_llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;

/// Trait for tools that agents can execute
#[async_trait]
pub trait Tool: Send + Sync {
    /// Run the tool
    ///
    /// `params` should match [`Tool::input_schema`]; implementations validate
    /// it anyway since the model may send anything.
    async fn execute(&self, params: Value) -> Result<Value>;

    /// Unique within a registry
    fn name(&self) -> &str;

    /// Tells the model when to use the tool
    fn description(&self) -> &str;

    /// JSON Schema of the argument object
    fn input_schema(&self) -> Value;

    /// Definition advertised in completion requests
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}
