use super::usage::Usage;
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Everything the engine reports while an operation runs.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ThinkingStarted,
    ThinkingDelta { text: String },
    ThinkingComplete { total_length: usize },
    ResponseStarted,
    ResponseDelta { text: String },
    ResponseComplete { total_length: usize },
    ToolCallStarted { id: String, name: String },
    ToolInputDelta { id: String, partial_json: String },
    ToolCall { id: String, name: String, input: Value },
    ToolResult {
        id: String,
        name: String,
        preview: String,
        result_length: usize,
        truncated: bool,
    },
    TurnComplete { turn: usize, usage: Usage },
    Complete {
        thinking_length: usize,
        response_length: usize,
        success: bool,
        usage: Usage,
    },
    Error { error: String },
    PhaseStarted { phase: String, phase_number: usize },
}

impl EngineEvent {
    pub fn suffix(&self) -> &'static str {
        match self {
            EngineEvent::ThinkingStarted => "thinking_started",
            EngineEvent::ThinkingDelta { .. } => "thinking_delta",
            EngineEvent::ThinkingComplete { .. } => "thinking_complete",
            EngineEvent::ResponseStarted => "response_started",
            EngineEvent::ResponseDelta { .. } => "response_delta",
            EngineEvent::ResponseComplete { .. } => "response_complete",
            EngineEvent::ToolCallStarted { .. } => "tool_call_started",
            EngineEvent::ToolInputDelta { .. } => "tool_input_delta",
            EngineEvent::ToolCall { .. } => "tool_call",
            EngineEvent::ToolResult { .. } => "tool_result",
            EngineEvent::TurnComplete { .. } => "turn_complete",
            EngineEvent::Complete { .. } => "complete",
            EngineEvent::Error { .. } => "error",
            EngineEvent::PhaseStarted { .. } => "phase_started",
        }
    }

    pub fn payload(&self) -> Map<String, Value> {
        let value = match self {
            EngineEvent::ThinkingStarted | EngineEvent::ResponseStarted => json!({}),
            EngineEvent::ThinkingDelta { text } | EngineEvent::ResponseDelta { text } => {
                json!({ "text": text })
            }
            EngineEvent::ThinkingComplete { total_length }
            | EngineEvent::ResponseComplete { total_length } => {
                json!({ "total_length": total_length })
            }
            EngineEvent::ToolCallStarted { id, name } => json!({ "id": id, "name": name }),
            EngineEvent::ToolInputDelta { id, partial_json } => {
                json!({ "id": id, "partial_json": partial_json })
            }
            EngineEvent::ToolCall { id, name, input } => {
                json!({ "id": id, "name": name, "input": input })
            }
            EngineEvent::ToolResult {
                id,
                name,
                preview,
                result_length,
                truncated,
            } => json!({
                "id": id,
                "name": name,
                "preview": preview,
                "result_length": result_length,
                "truncated": truncated,
            }),
            EngineEvent::TurnComplete { turn, usage } => json!({ "turn": turn, "usage": usage }),
            EngineEvent::Complete {
                thinking_length,
                response_length,
                success,
                usage,
            } => json!({
                "thinking_length": thinking_length,
                "response_length": response_length,
                "success": success,
                "usage": usage,
            }),
            EngineEvent::Error { error } => json!({ "error": error }),
            EngineEvent::PhaseStarted {
                phase,
                phase_number,
            } => json!({ "phase": phase, "phase_number": phase_number }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Wire form of an event: `<prefix>_<suffix>` plus a JSON map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    pub name: String,
    pub payload: Map<String, Value>,
}

impl StreamEvent {
    pub fn new(prefix: &str, event: &EngineEvent) -> Self {
        let name = if prefix.is_empty() {
            event.suffix().to_string()
        } else {
            format!("{prefix}_{}", event.suffix())
        };
        Self {
            name,
            payload: event.payload(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }
}
