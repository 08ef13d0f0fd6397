//! Wire format of the Messages streaming API.

use crate::domain::{ContentBlock, Role, ToolDefinition, Turn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Serialize)]
pub(super) struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub thinking: ThinkingConfig,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub system: &'a str,
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub budget_tokens: u32,
}

impl ThinkingConfig {
    pub fn enabled(budget_tokens: u32) -> Self {
        Self {
            kind: "enabled",
            budget_tokens,
        }
    }
}

/// Tool results travel back in a user-role message.
pub(super) fn encode_turn(turn: &Turn) -> Value {
    let role = match turn.role {
        Role::Assistant => "assistant",
        Role::User | Role::Tool => "user",
    };
    let content: Vec<Value> = turn.blocks.iter().map(encode_block).collect();
    json!({ "role": role, "content": content })
}

fn encode_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Reasoning { text, continuation } => match continuation {
            Some(signature) => json!({
                "type": "thinking",
                "thinking": text,
                "signature": signature,
            }),
            None => json!({ "type": "thinking", "thinking": text }),
        },
        ContentBlock::RedactedReasoning { data } => {
            json!({ "type": "redacted_thinking", "data": data })
        }
        ContentBlock::Image { media_type, data } => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": data,
            },
        }),
        ContentBlock::Answer { text } => json!({ "type": "text", "text": text }),
        ContentBlock::ToolCall { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_call_id,
            content,
            ..
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_call_id,
            "content": content,
        }),
    }
}

pub(super) fn encode_tool(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct MessageStart {
    pub message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct MessageStartBody {
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub(super) struct WireUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentBlockStart {
    pub index: usize,
    pub content_block: WireBlock,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum WireBlock {
    Thinking,
    RedactedThinking { data: String },
    Text,
    ToolUse { id: String, name: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentBlockDelta {
    pub index: usize,
    pub delta: WireDelta,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum WireDelta {
    ThinkingDelta { thinking: String },
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    SignatureDelta { signature: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentBlockStop {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub(super) struct MessageDelta {
    pub delta: MessageDeltaBody,
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct MessageDeltaBody {
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamError {
    pub error: StreamErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
