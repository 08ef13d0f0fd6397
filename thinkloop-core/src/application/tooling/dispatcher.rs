use super::error::ToolError;
use super::registry::ToolRegistry;
use crate::constants::TOOL_RESULT_CAP;
use crate::domain::{ToolCallRecord, ToolDefinition};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

/// What the model sees for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub content: String,
    pub truncated: bool,
    /// Character length before the cap was applied.
    pub original_length: usize,
}

impl DispatchResult {
    /// First `max_chars` characters, for event payloads.
    pub fn preview(&self, max_chars: usize) -> String {
        self.content.chars().take(max_chars).collect()
    }
}

/// Routes tool calls to handlers for a single operation and keeps its call log.
///
/// Handler failures, panics included, never escape: they become an
/// `{"error": "..."}` result the model can react to.
#[derive(Debug)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    cap: usize,
    log: Vec<ToolCallRecord>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            cap: TOOL_RESULT_CAP,
            log: Vec::new(),
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub async fn execute(&mut self, name: &str, input: Value) -> DispatchResult {
        let outcome = match self.registry.get(name) {
            Some(handler) => {
                debug!(tool = %name, "Dispatching tool call");
                match AssertUnwindSafe(handler.call(input.clone()))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Panicked {
                        tool: name.to_string(),
                    }),
                }
            }
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        let content = match outcome {
            Ok(content) => content,
            Err(err) => {
                warn!(tool = %name, error = %err, "Tool call failed");
                err.payload()
            }
        };

        let result = cap_result(content, self.cap);
        info!(
            tool = %name,
            result_length = result.content.chars().count(),
            truncated = result.truncated,
            "Tool executed"
        );
        self.log.push(ToolCallRecord {
            name: name.to_string(),
            input,
            result_length: result.content.chars().count(),
        });
        result
    }

    pub fn log(&self) -> &[ToolCallRecord] {
        &self.log
    }

    pub fn into_log(self) -> Vec<ToolCallRecord> {
        self.log
    }
}

/// Cut `content` to `cap` characters and append a note with the original length.
pub fn cap_result(content: String, cap: usize) -> DispatchResult {
    let original_length = content.chars().count();
    if original_length <= cap {
        return DispatchResult {
            content,
            truncated: false,
            original_length,
        };
    }
    let mut capped: String = content.chars().take(cap).collect();
    capped.push_str(&format!(
        "\n\n[Truncated: result was {original_length} characters]"
    ));
    DispatchResult {
        content: capped,
        truncated: true,
        original_length,
    }
}
