use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Declaration of a callable tool as presented to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema (object) describing the input parameters.
    pub parameters: Value,
}

/// Tool execution failures. These are shown to the model, never the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid input for {tool}: {reason}")]
    InvalidInput { tool: String, reason: String },
    #[error("{0}")]
    NotFound(String),
    #[error("tool {0} timed out")]
    Timeout(String),
    #[error("tool {tool} failed: {reason}")]
    Failed { tool: String, reason: String },
}

/// A single tool an agent may call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Run the tool. Input has already been validated against
    /// [`Tool::parameters_schema`].
    async fn execute(&self, input: &Value) -> Result<Value, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The tool execution collaborator handed to a tool-using agent.
///
/// Implementations must treat `input` as untrusted.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    async fn execute(&self, tool_name: &str, input: &Value) -> Result<Value, ToolError>;
}
