//! Per-agent tool registry: unique names, schema validation, dispatch.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::schema::validate_input;
use super::traits::{Tool, ToolError, ToolExecutor, ToolSpec};

/// The tools declared by one agent. Implements [`ToolExecutor`] by name
/// lookup, validating every input before the handler sees it.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique within the registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.get(tool.name()).is_some() {
            bail!("tool already registered: {}", tool.name());
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    async fn execute(&self, tool_name: &str, input: &Value) -> Result<Value, ToolError> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        validate_input(&tool.parameters_schema(), input).map_err(|reason| {
            ToolError::InvalidInput {
                tool: tool_name.to_string(),
                reason,
            }
        })?;

        tool.execute(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct EchoTool {
        seen: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the message back"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })
        }
        async fn execute(&self, input: &Value) -> Result<Value, ToolError> {
            self.seen.lock().push(input.clone());
            Ok(json!({ "echo": input["message"] }))
        }
    }

    fn echo() -> Arc<EchoTool> {
        Arc::new(EchoTool {
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(echo()).unwrap();
        let err = registry.register(echo()).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn specs_mirror_tools() {
        let registry = ToolRegistry::new().with_tool(echo()).unwrap();
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert!(specs[0].parameters["properties"].is_object());
    }

    #[tokio::test]
    async fn execute_dispatches_valid_input() {
        let tool = echo();
        let registry = ToolRegistry::new().with_tool(tool.clone()).unwrap();
        let out = registry
            .execute("echo", &json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(out["echo"], "hi");
        assert_eq!(tool.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_handler() {
        let tool = echo();
        let registry = ToolRegistry::new().with_tool(tool.clone()).unwrap();
        let err = registry
            .execute("echo", &json!({"message": 42}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
        assert!(tool.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("rm_rf", &json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("rm_rf".into()));
    }
}
