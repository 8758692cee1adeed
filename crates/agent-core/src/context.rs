//! Execution context for agents
//!
//! The `Context` struct is a key-value store that travels with a single agent
//! invocation. The pipeline seeds it with the subject (ticker) and stage id;
//! agents write back bookkeeping such as token usage and tool call counts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known context keys
pub mod keys {
    /// Subject of the analysis (ticker symbol)
    pub const SUBJECT: &str = "subject";
    /// Pipeline stage currently executing
    pub const STAGE: &str = "stage";
    /// Run identifier shared by every stage of a pipeline run
    pub const RUN_ID: &str = "run_id";
    /// Token usage reported by the agent (`{"input_tokens", "output_tokens"}`)
    pub const TOKEN_USAGE: &str = "token_usage";
    /// Number of tool calls the agent made
    pub const TOOL_CALLS: &str = "tool_calls";
    /// Number of LLM round trips the agent made
    pub const ITERATIONS: &str = "iterations";
    /// Whether the agent's answer was cut off by the token limit
    pub const TRUNCATED: &str = "truncated";
}

/// Context passed to agents during execution
///
/// # Example
///
/// ```
/// use agent_core::Context;
///
/// let ctx = Context::new()
///     .with_subject("AAPL")
///     .with_stage("technical");
///
/// assert_eq!(ctx.subject(), Some("AAPL"));
/// assert_eq!(ctx.stage(), Some("technical"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: HashMap<String, serde_json::Value>,
}

impl Context {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the analysis subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.insert(keys::SUBJECT, serde_json::json!(subject.into()));
        self
    }

    /// Set the pipeline stage
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.insert(keys::STAGE, serde_json::json!(stage.into()));
        self
    }

    /// Set the run identifier
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.insert(keys::RUN_ID, serde_json::json!(run_id.into()));
        self
    }

    /// Get the analysis subject
    pub fn subject(&self) -> Option<&str> {
        self.get(keys::SUBJECT).and_then(|v| v.as_str())
    }

    /// Get the pipeline stage
    pub fn stage(&self) -> Option<&str> {
        self.get(keys::STAGE).and_then(|v| v.as_str())
    }

    /// Get the run identifier
    pub fn run_id(&self) -> Option<&str> {
        self.get(keys::RUN_ID).and_then(|v| v.as_str())
    }

    /// Number of tool calls recorded by the agent
    pub fn tool_calls(&self) -> usize {
        self.get(keys::TOOL_CALLS)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as usize
    }

    /// Whether the agent reported a truncated answer
    pub fn truncated(&self) -> bool {
        self.get(keys::TRUNCATED)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Insert a value into the context
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a value from the context
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Insert a typed value into the context
    ///
    /// Serializes the value to JSON before storing.
    pub fn insert_typed<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> crate::Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| {
            crate::Error::ProcessingFailed(format!("Failed to serialize context value: {e}"))
        })?;
        self.data.insert(key.into(), json_value);
        Ok(())
    }

    /// Get a typed value from the context
    ///
    /// Deserializes the JSON value into the specified type.
    pub fn get_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => {
                let typed = serde_json::from_value(value.clone()).map_err(|e| {
                    crate::Error::ProcessingFailed(format!(
                        "Failed to deserialize context value: {e}"
                    ))
                })?;
                Ok(Some(typed))
            }
        }
    }

    /// Check if a key exists in the context
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Remove a value from the context
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Get the number of entries in the context
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the context is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Merge another context into this one (other values override)
    pub fn merge(&mut self, other: Context) {
        self.data.extend(other.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Usage {
        input_tokens: usize,
        output_tokens: usize,
    }

    #[test]
    fn test_basic_operations() {
        let mut ctx = Context::new();
        assert!(ctx.is_empty());

        ctx.insert("key", serde_json::json!("value"));
        assert_eq!(ctx.len(), 1);
        assert!(ctx.contains_key("key"));

        ctx.remove("key");
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_typed_round_trip() {
        let mut ctx = Context::new();
        let usage = Usage {
            input_tokens: 120,
            output_tokens: 40,
        };

        ctx.insert_typed(keys::TOKEN_USAGE, &usage).unwrap();

        let retrieved: Usage = ctx.get_typed(keys::TOKEN_USAGE).unwrap().unwrap();
        assert_eq!(retrieved, usage);
    }

    #[test]
    fn test_builder_chain() {
        let ctx = Context::new()
            .with_subject("MSFT")
            .with_stage("risk")
            .with_run_id("run-1");

        assert_eq!(ctx.subject(), Some("MSFT"));
        assert_eq!(ctx.stage(), Some("risk"));
        assert_eq!(ctx.run_id(), Some("run-1"));
    }

    #[test]
    fn test_bookkeeping_defaults() {
        let mut ctx = Context::new();
        assert_eq!(ctx.tool_calls(), 0);
        assert!(!ctx.truncated());

        ctx.insert(keys::TOOL_CALLS, serde_json::json!(3));
        ctx.insert(keys::TRUNCATED, serde_json::json!(true));
        assert_eq!(ctx.tool_calls(), 3);
        assert!(ctx.truncated());
    }

    #[test]
    fn test_merge_overrides() {
        let mut ctx1 = Context::new().with_stage("market");
        let ctx2 = Context::new().with_stage("technical").with_subject("AAPL");

        ctx1.merge(ctx2);
        assert_eq!(ctx1.stage(), Some("technical"));
        assert_eq!(ctx1.subject(), Some("AAPL"));
    }

    #[test]
    fn test_get_typed_wrong_shape() {
        let mut ctx = Context::new();
        ctx.insert(keys::TOKEN_USAGE, serde_json::json!("not an object"));
        let result: crate::Result<Option<Usage>> = ctx.get_typed(keys::TOKEN_USAGE);
        assert!(result.is_err());
    }
}
