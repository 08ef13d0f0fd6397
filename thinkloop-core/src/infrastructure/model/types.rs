//! Model types - request, streamed chunks, turn summary, and errors

use crate::domain::{ContentBlock, ToolDefinition, Turn, Usage};
use futures::Stream;
use reqwest::StatusCode;
use std::pin::Pin;
use thiserror::Error;

/// One call across the model-streaming boundary.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub model: String,
    pub max_output_tokens: u32,
    pub reasoning_budget_tokens: u32,
    pub system: String,
    pub turns: Vec<Turn>,
    /// `None` omits tool declarations from the request entirely.
    pub tools: Option<Vec<ToolDefinition>>,
}

impl TurnRequest {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.reasoning_budget_tokens >= self.max_output_tokens {
            return Err(ModelError::invalid_request(format!(
                "reasoning budget ({}) must be below max output tokens ({})",
                self.reasoning_budget_tokens, self.max_output_tokens
            )));
        }
        if self.turns.is_empty() {
            return Err(ModelError::invalid_request("request has no turns"));
        }
        Ok(())
    }

    pub fn declares_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Reasoning,
    /// Withheld reasoning; the opaque payload arrives whole with the start.
    RedactedReasoning { data: String },
    Answer,
    ToolCall { id: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Reasoning(String),
    Answer(String),
    ToolInput(String),
    /// Opaque continuation fragment for the current reasoning block.
    Continuation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    NaturalEnd,
    ToolRequested,
    BudgetExhausted,
}

impl StopReason {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "tool_use" => StopReason::ToolRequested,
            "max_tokens" => StopReason::BudgetExhausted,
            _ => StopReason::NaturalEnd,
        }
    }
}

/// Final summary of a streamed turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnSummary {
    pub usage: Usage,
    pub stop_reason: StopReason,
    pub blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    BlockStart { index: usize, kind: BlockKind },
    BlockDelta { index: usize, delta: Delta },
    BlockStop { index: usize },
    Finished(TurnSummary),
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ModelError>> + Send>>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider '{provider}' requires an API key")]
    MissingApiKey { provider: String },
    #[error("network error calling provider '{provider}': {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("stream from provider '{provider}' failed: {message}")]
    Stream { provider: String, message: String },
    #[error("provider '{provider}' reported {kind}: {message}")]
    Api {
        provider: String,
        kind: String,
        message: String,
    },
    #[error("provider '{provider}' returned invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
    #[error("invalid model request: {reason}")]
    InvalidRequest { reason: String },
}

impl ModelError {
    pub fn missing_api_key(provider: impl Into<String>) -> Self {
        Self::MissingApiKey {
            provider: provider.into(),
        }
    }

    pub fn network(provider: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            provider: provider.into(),
            source,
        }
    }

    pub fn stream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stream {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn api(
        provider: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            provider: provider.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ModelError::MissingApiKey { provider } => format!(
                "Provider '{provider}' requires an API key. Set api_key in the configuration or the environment."
            ),
            ModelError::Network { provider, source } => {
                if source.is_connect() {
                    format!("Could not connect to model provider '{provider}'.")
                } else if source.is_timeout() {
                    format!("Request to '{provider}' timed out. Try again shortly.")
                } else if let Some(status) = source.status() {
                    match status {
                        StatusCode::TOO_MANY_REQUESTS => {
                            format!("Provider '{provider}' is rate limiting requests. Try again later.")
                        }
                        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                            format!("Provider '{provider}' is temporarily unavailable.")
                        }
                        _ => format!("Request to '{provider}' failed with status {}.", status.as_u16()),
                    }
                } else {
                    format!("Network error while contacting '{provider}'.")
                }
            }
            ModelError::Stream { provider, .. } => {
                format!("The response stream from '{provider}' was interrupted.")
            }
            ModelError::Api { provider, kind, .. } => {
                format!("Provider '{provider}' rejected the request ({kind}).")
            }
            ModelError::InvalidResponse { provider, .. } => {
                format!("Provider '{provider}' returned a response that could not be processed.")
            }
            ModelError::InvalidRequest { reason } => format!("The request was invalid: {reason}."),
        }
    }
}
