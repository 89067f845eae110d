//! Tool invocation seams
//!
//! Tool calls are resolved against two collaborators: a remote tool executor
//! (checked first, by name) and the local dispatcher. Both normalise their
//! outcome into a [`ToolResult`].

mod recovery;

use async_trait::async_trait;
use serde_json::Value;

pub use recovery::{JsonToolCallRecovery, RecoveredCall, TOOL_CALL_MARKER, ToolCallRecovery};

/// Argument payload used when a tool call arrives without arguments
pub const EMPTY_ARGUMENTS: &str = "{}";

/// A normalised tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments
    pub arguments: String,
}

impl ToolCall {
    /// Arguments as sent back to the model, `{}` when empty
    pub fn arguments_or_empty(&self) -> &str {
        if self.arguments.trim().is_empty() {
            EMPTY_ARGUMENTS
        } else {
            &self.arguments
        }
    }

    /// Parse the argument payload.
    pub fn parsed_arguments(&self) -> Result<Value, ToolError> {
        serde_json::from_str(self.arguments_or_empty())
            .map_err(|e| ToolError::InvalidArguments(format!("{}: {}", self.name, e)))
    }
}

/// Outcome of a tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    /// Final answer, spoken as is
    Respond(String),
    /// Text fed back into the model for another round
    Continue(String),
    /// No tool with that name
    NotFound(String),
    /// Tool failed; the text is spoken to the user
    Error(String),
}

impl ToolResult {
    /// Text spoken to the user when the result ends the turn
    pub fn spoken_text(&self) -> &str {
        match self {
            ToolResult::Respond(text)
            | ToolResult::Continue(text)
            | ToolResult::NotFound(text)
            | ToolResult::Error(text) => text,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Tool backend unavailable: {0}")]
    Unavailable(String),
}

/// Local tool catalog and dispatcher
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Tool catalog in function-calling schema form
    async fn list_tools(&self) -> Vec<Value>;

    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError>;

    /// Release resources held for the session
    async fn cleanup(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Remote tool-execution collaborator
#[async_trait]
pub trait RemoteTools: Send + Sync {
    fn is_known(&self, name: &str) -> bool;

    async fn list_tools(&self) -> Vec<Value> {
        Vec::new()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError>;

    async fn cleanup(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Dispatcher with no tools
#[derive(Debug, Clone, Default)]
pub struct EmptyToolbox;

#[async_trait]
impl ToolDispatcher for EmptyToolbox {
    async fn list_tools(&self) -> Vec<Value> {
        Vec::new()
    }

    async fn invoke(&self, name: &str, _arguments: Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::NotFound(format!("I don't have a tool called {name}.")))
    }
}

/// Remote executor that knows no tools
#[derive(Debug, Clone, Default)]
pub struct NoRemoteTools;

#[async_trait]
impl RemoteTools for NoRemoteTools {
    fn is_known(&self, _name: &str) -> bool {
        false
    }

    async fn invoke(&self, name: &str, _arguments: Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::Unavailable(format!("no remote tool {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(arguments: &str) -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: "lookup".to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_empty_arguments_default_to_object() {
        assert_eq!(call("").arguments_or_empty(), "{}");
        assert_eq!(call("  ").parsed_arguments().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_invalid_arguments_are_reported() {
        let err = call("{not json").parsed_arguments().unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_empty_toolbox_reports_not_found() {
        let toolbox = EmptyToolbox;
        assert!(toolbox.list_tools().await.is_empty());
        let result = toolbox.invoke("play_music", serde_json::json!({})).await.unwrap();
        assert!(matches!(result, ToolResult::NotFound(_)));
        assert!(result.spoken_text().contains("play_music"));
    }
}
