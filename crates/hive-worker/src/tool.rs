//! Tool registration and invocation for the ReAct loop.
//!
//! Grounded in `toka-toolkit-core::{Tool, ToolRegistry}`: same
//! name/description/execute shape, narrowed to the JSON-in/JSON-out
//! contract [`hive_llm::ToolCall`] already carries, and to a plain
//! `HashMap` since tool registration happens once at worker setup, not
//! concurrently from multiple tasks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hive_llm::{ToolCall, ToolSchema};
use serde_json::Value;

/// Contract every worker-invocable tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model must use in a [`ToolCall::name`] to invoke this tool.
    fn name(&self) -> &str;
    /// Shown to the model alongside the name.
    fn description(&self) -> &str;
    /// JSON schema for the argument object; an empty-object schema by
    /// default (no required arguments).
    fn parameters(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    /// Runs the tool against `args`, returning a JSON result or a
    /// human-readable error the model can react to.
    async fn execute(&self, args: &Value) -> Result<Value, String>;
}

/// Looks up and invokes registered [`Tool`]s by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ToolRegistry::default()
    }

    /// Registers `tool`, overwriting any prior registration under the
    /// same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Schemas for every registered tool, to advertise to the model.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Runs the tool named by `call.name`, passing `call.arguments`.
    pub async fn execute(&self, call: &ToolCall) -> Result<Value, String> {
        let tool = self.tools.get(&call.name).ok_or_else(|| format!("unknown tool {:?}", call.name))?;
        tool.execute(&call.arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;
    #[async_trait]
    impl Tool for AlwaysFails {
        fn name(&self) -> &str {
            "fails"
        }
        fn description(&self) -> &str {
            "always returns an error"
        }
        async fn execute(&self, _args: &Value) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn unknown_tool_name_is_an_error_not_a_panic() {
        let registry = ToolRegistry::new();
        let call = ToolCall { id: "1".to_string(), name: "missing".to_string(), arguments: serde_json::json!({}) };
        assert!(registry.execute(&call).await.is_err());
    }

    #[tokio::test]
    async fn tool_error_propagates_as_err_not_panic() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AlwaysFails));
        let call = ToolCall { id: "1".to_string(), name: "fails".to_string(), arguments: serde_json::json!({}) };
        assert_eq!(registry.execute(&call).await.unwrap_err(), "boom");
    }

    #[test]
    fn schemas_reflect_every_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AlwaysFails));
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "fails");
    }
}
