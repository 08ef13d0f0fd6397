use crate::constants::IMAGE_CONTEXT_CHARS;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One part of a turn.
///
/// The `continuation` on a reasoning block and the `data` of a redacted
/// reasoning block are opaque: they are carried and replayed byte-for-byte
/// and never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        continuation: Option<String>,
    },
    /// Reasoning the provider withheld; only the encrypted payload arrives.
    RedactedReasoning {
        data: String,
    },
    /// Base64 image attached to a user turn.
    Image {
        media_type: String,
        data: String,
    },
    Answer {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        truncated: bool,
    },
}

impl ContentBlock {
    pub fn answer(text: impl Into<String>) -> Self {
        ContentBlock::Answer { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>, continuation: Option<String>) -> Self {
        ContentBlock::Reasoning {
            text: text.into(),
            continuation,
        }
    }

    pub fn redacted_reasoning(data: impl Into<String>) -> Self {
        ContentBlock::RedactedReasoning { data: data.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentBlock::Image {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, ContentBlock::ToolCall { .. })
    }

    /// Characters this block contributes to the context estimate.
    ///
    /// Images are charged a flat [`IMAGE_CONTEXT_CHARS`]; opaque payloads are free.
    pub fn char_len(&self) -> usize {
        match self {
            ContentBlock::Reasoning { text, .. } | ContentBlock::Answer { text } => {
                text.chars().count()
            }
            ContentBlock::RedactedReasoning { .. } => 0,
            ContentBlock::Image { .. } => IMAGE_CONTEXT_CHARS,
            ContentBlock::ToolCall { name, input, .. } => {
                name.chars().count() + input.to_string().chars().count()
            }
            ContentBlock::ToolResult { content, .. } => content.chars().count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![ContentBlock::answer(text)],
        }
    }

    /// User turn with text first and `images` after it.
    pub fn user_with_images(text: impl Into<String>, images: Vec<ContentBlock>) -> Self {
        let mut blocks = Vec::with_capacity(images.len() + 1);
        blocks.push(ContentBlock::answer(text));
        blocks.extend(images);
        Self {
            role: Role::User,
            blocks,
        }
    }

    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            blocks,
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::ToolCall { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    pub fn has_tool_call(&self) -> bool {
        self.blocks.iter().any(ContentBlock::is_tool_call)
    }

    /// Concatenated text of all answer blocks.
    pub fn answer_text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Answer { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text of all reasoning blocks.
    pub fn reasoning_text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Reasoning { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn char_len(&self) -> usize {
        self.blocks.iter().map(ContentBlock::char_len).sum()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool turn must follow an assistant turn")]
    NoPrecedingAssistant,
    #[error("tool turn may only contain tool results")]
    NonResultBlock,
    #[error("tool result references unknown tool call '{0}'")]
    UnknownToolCall(String),
    #[error("tool call '{0}' already has a result")]
    DuplicateResult(String),
}

/// Ordered, append-only history for one in-flight operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    pub fn push_user_with_images(&mut self, text: impl Into<String>, images: Vec<ContentBlock>) {
        self.turns.push(Turn::user_with_images(text, images));
    }

    /// Append the assistant turn exactly as received, continuation tokens included.
    pub fn push_assistant(&mut self, blocks: Vec<ContentBlock>) {
        self.turns.push(Turn::assistant(blocks));
    }

    /// Append a tool turn. Every block must be a result answering a distinct
    /// tool call from the immediately preceding assistant turn.
    pub fn push_tool_results(&mut self, results: Vec<ContentBlock>) -> Result<(), ConversationError> {
        let previous = self
            .turns
            .last()
            .filter(|turn| turn.role == Role::Assistant)
            .ok_or(ConversationError::NoPrecedingAssistant)?;
        let known: HashSet<&str> = previous.tool_calls().map(|(id, _, _)| id).collect();
        let mut answered = HashSet::new();
        for block in &results {
            let ContentBlock::ToolResult { tool_call_id, .. } = block else {
                return Err(ConversationError::NonResultBlock);
            };
            if !known.contains(tool_call_id.as_str()) {
                return Err(ConversationError::UnknownToolCall(tool_call_id.clone()));
            }
            if !answered.insert(tool_call_id.clone()) {
                return Err(ConversationError::DuplicateResult(tool_call_id.clone()));
            }
        }
        self.turns.push(Turn {
            role: Role::Tool,
            blocks: results,
        });
        Ok(())
    }

    pub fn has_tool_call(&self) -> bool {
        self.turns.iter().any(Turn::has_tool_call)
    }

    pub fn char_len(&self) -> usize {
        self.turns.iter().map(Turn::char_len).sum()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A tool the model may request, as declared by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Serialized schema text; declared tools count toward the context budget.
    pub fn char_len(&self) -> usize {
        self.name.chars().count()
            + self.description.chars().count()
            + self.input_schema.to_string().chars().count()
    }
}

/// Observability log entry for one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Value,
    pub result_length: usize,
}
