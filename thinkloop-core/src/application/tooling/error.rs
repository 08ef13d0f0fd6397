use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("{tool} execution error: {message}")]
    Execution { tool: String, message: String },
    #[error("{tool} execution error: handler panicked")]
    Panicked { tool: String },
    #[error("{tool} execution error: invalid input: {reason}")]
    InvalidInput { tool: String, reason: String },
    #[error("tool '{0}' is registered more than once")]
    DuplicateTool(String),
}

impl ToolError {
    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidInput {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// The `{"error": "..."}` string fed back to the model in place of a result.
    pub fn payload(&self) -> String {
        json!({ "error": self.to_string() }).to_string()
    }

    pub fn user_message(&self) -> String {
        match self {
            ToolError::UnknownTool(name) => format!("Tool \"{name}\" is not available."),
            ToolError::Execution { tool, message } => {
                format!("Tool \"{tool}\" failed: {message}")
            }
            ToolError::Panicked { tool } => {
                format!("Tool \"{tool}\" crashed while running.")
            }
            ToolError::InvalidInput { tool, reason } => {
                format!("Tool \"{tool}\" received invalid input: {reason}")
            }
            ToolError::DuplicateTool(name) => {
                format!("Tool \"{name}\" is declared twice; check the tool set.")
            }
        }
    }
}
