//! Tool registry - maps names to tool adapters for the agent

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::ToolDefinition;

use super::traits::Tool;

/// Registry of available tools.
///
/// Registration is programmatic; host applications extend the default
/// set via [`ToolRegistry::extend_from`]. Duplicate names overwrite
/// silently (keeping the original schema position), empty names are
/// rejected. Definitions are listed in insertion order.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Overwrites silently if the name already exists.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "tool has an empty name".to_string(),
            ));
        }
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
        Ok(())
    }

    /// Register a batch of plugin adapters supplied by the host.
    pub fn extend_from(
        &mut self,
        plugins: impl IntoIterator<Item = Arc<dyn Tool>>,
    ) -> Result<usize> {
        let mut loaded = 0;
        for tool in plugins {
            self.register(tool)?;
            loaded += 1;
        }
        if loaded > 0 {
            debug!("Registered {} plugin tool(s)", loaded);
        }
        Ok(loaded)
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Whether `name` refers to a parallel-safe tool.
    ///
    /// Unknown tools are treated as mutating so they can never be
    /// reordered or batched.
    pub fn is_parallel_safe(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .map(|t| t.parallel_safe())
            .unwrap_or(false)
    }

    /// Wire-format definitions for all tools, in insertion order
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.schema().to_definition())
            .collect()
    }

    /// Names of all registered tools, in insertion order
    pub fn list_names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a tool call by name. Returns `(content, is_error)`.
    ///
    /// Unknown tools and adapter failures are encoded into the result;
    /// this method never propagates an error upward.
    pub async fn dispatch(&self, name: &str, args: &Value, cwd: &Path) -> (String, bool) {
        let Some(tool) = self.tools.get(name) else {
            return (format!("Unknown tool: {}", name), true);
        };
        match tool.execute(args, cwd).await {
            Ok(output) => (output.content, output.error),
            Err(e) => (format!("Tool error: {}", e), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::traits::ToolOutput;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeTool {
        name: &'static str,
        safe: bool,
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        fn parallel_safe(&self) -> bool {
            self.safe
        }
        async fn execute(&self, _args: &Value, _cwd: &Path) -> crate::Result<ToolOutput> {
            Ok(ToolOutput::ok(format!("{} ran", self.name)))
        }
    }

    struct EmptyNameTool;

    #[async_trait]
    impl Tool for EmptyNameTool {
        fn name(&self) -> &str {
            ""
        }
        fn description(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> Value {
            json!({})
        }
        async fn execute(&self, _args: &Value, _cwd: &Path) -> crate::Result<ToolOutput> {
            Ok(ToolOutput::ok(""))
        }
    }

    #[test]
    fn definitions_preserve_insertion_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(FakeTool { name: "b_tool", safe: true }))
            .unwrap();
        registry
            .register(Arc::new(FakeTool { name: "a_tool", safe: false }))
            .unwrap();
        let names: Vec<String> = registry
            .list_definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    #[test]
    fn empty_name_rejected() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(EmptyNameTool)).is_err());
    }

    #[test]
    fn duplicate_overwrites_silently() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(FakeTool { name: "t", safe: false }))
            .unwrap();
        registry
            .register(Arc::new(FakeTool { name: "t", safe: true }))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.is_parallel_safe("t"));
    }

    #[test]
    fn unknown_tool_is_not_parallel_safe() {
        let registry = ToolRegistry::new();
        assert!(!registry.is_parallel_safe("nope"));
    }

    #[test]
    fn dispatch_unknown_tool_errors_in_band() {
        let registry = ToolRegistry::new();
        let (content, error) =
            tokio_test::block_on(registry.dispatch("missing", &json!({}), Path::new("/tmp")));
        assert!(error);
        assert!(content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn dispatch_runs_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(FakeTool { name: "t", safe: true }))
            .unwrap();
        let (content, error) = registry.dispatch("t", &json!({}), Path::new("/tmp")).await;
        assert!(!error);
        assert_eq!(content, "t ran");
    }
}
