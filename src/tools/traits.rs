//! Core tool trait and schema types

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::llm::{FunctionDefinition, ToolDefinition};

/// JSON-schema description of a tool, serialized verbatim to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema object: `{"type": "object", "properties": …, "required": …}`
    pub parameters: Value,
}

impl ToolSchema {
    /// Convert to the wire-format tool definition.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }
}

/// Output of one tool execution: content plus an error flag.
///
/// An error output is a normal outcome - it is recorded and surfaced to
/// the LLM on the next plan, never retried by the dispatcher.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        ToolOutput {
            content: content.into(),
            error: false,
        }
    }

    pub fn err(content: impl Into<String>) -> Self {
        ToolOutput {
            content: content.into(),
            error: true,
        }
    }
}

/// A tool adapter the LLM can invoke by name.
///
/// A tool may declare itself `parallel_safe` only if it has no side
/// effects outside `cwd/.retrai/cache`, touches no shared mutable state,
/// and is idempotent for identical args.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used for dispatch
    fn name(&self) -> &str;

    /// One-line description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for the tool parameters
    fn parameters_schema(&self) -> Value;

    /// Whether the tool can run concurrently with other read-only tools
    fn parallel_safe(&self) -> bool {
        false
    }

    /// Execute the tool against the project root
    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput>;

    /// Assembled schema for LLM consumption
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_json_round_trip_is_identity() {
        let schema = ToolSchema {
            name: "file_read".to_string(),
            description: "Read file contents".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        };
        let encoded = serde_json::to_string(&schema).unwrap();
        let decoded: ToolSchema = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.name, schema.name);
        assert_eq!(decoded.description, schema.description);
        assert_eq!(decoded.parameters, schema.parameters);
    }

    #[test]
    fn definition_carries_schema_verbatim() {
        let schema = ToolSchema {
            name: "t".to_string(),
            description: "d".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        };
        let def = schema.to_definition();
        assert_eq!(def.tool_type, "function");
        assert_eq!(def.function.name, "t");
        assert_eq!(def.function.parameters, schema.parameters);
    }
}
