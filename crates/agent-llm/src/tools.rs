//! Tool definition types for LLM tool use

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool description advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Must match the registered tool's name
    pub name: String,

    pub description: String,

    /// JSON Schema of the input object
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// JSON Schema fragments for tool inputs
///
/// ```
/// use agent_llm::tools::schema;
/// use serde_json::json;
///
/// let input = schema::object(
///     json!({
///         "query": schema::string("Search query"),
///         "limit": schema::integer("Maximum results"),
///     }),
///     &["query"],
/// );
/// assert_eq!(input["required"][0], "query");
/// ```
pub mod schema {
    use serde_json::{Value, json};

    pub fn object(properties: Value, required: &[&str]) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn string(description: &str) -> Value {
        json!({ "type": "string", "description": description })
    }

    pub fn number(description: &str) -> Value {
        json!({ "type": "number", "description": description })
    }

    pub fn integer(description: &str) -> Value {
        json!({ "type": "integer", "description": description })
    }

    pub fn boolean(description: &str) -> Value {
        json!({ "type": "boolean", "description": description })
    }

    /// Stock ticker input, shared by the market data tools
    pub fn ticker() -> Value {
        json!({
            "type": "string",
            "description": "Stock ticker symbol, e.g. AAPL or BRK.B",
            "pattern": "^[A-Za-z0-9.^=-]{1,10}$",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_definition_creation() {
        let input = schema::object(json!({ "ticker": schema::ticker() }), &["ticker"]);

        let tool = ToolDefinition::new("stock_data", "Quote and history", input.clone());
        assert_eq!(tool.name, "stock_data");
        assert_eq!(tool.input_schema, input);
        assert_eq!(input["properties"]["ticker"]["type"], "string");
    }

    #[test]
    fn test_schema_builders() {
        assert_eq!(schema::string("q")["type"], "string");
        assert_eq!(schema::integer("n")["type"], "integer");
        assert_eq!(schema::boolean("b")["type"], "boolean");
        assert_eq!(schema::number("x")["description"], "x");
    }
}
