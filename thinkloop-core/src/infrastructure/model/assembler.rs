//! Folds streamed chunks back into finished content blocks.

use super::types::{BlockKind, Delta, StopReason, StreamChunk, TurnSummary};
use crate::domain::{ContentBlock, Usage};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug)]
enum PartialBlock {
    Reasoning {
        text: String,
        continuation: Option<String>,
    },
    Redacted {
        data: String,
    },
    Answer {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        input_json: String,
    },
}

impl PartialBlock {
    fn start(kind: &BlockKind) -> Self {
        match kind {
            BlockKind::Reasoning => PartialBlock::Reasoning {
                text: String::new(),
                continuation: None,
            },
            BlockKind::RedactedReasoning { data } => PartialBlock::Redacted { data: data.clone() },
            BlockKind::Answer => PartialBlock::Answer {
                text: String::new(),
            },
            BlockKind::ToolCall { id, name } => PartialBlock::ToolCall {
                id: id.clone(),
                name: name.clone(),
                input_json: String::new(),
            },
        }
    }

    fn apply(&mut self, delta: &Delta) {
        match (self, delta) {
            (PartialBlock::Reasoning { text, .. }, Delta::Reasoning(chunk))
            | (PartialBlock::Answer { text }, Delta::Answer(chunk)) => text.push_str(chunk),
            (PartialBlock::Reasoning { continuation, .. }, Delta::Continuation(chunk)) => {
                continuation.get_or_insert_with(String::new).push_str(chunk);
            }
            (PartialBlock::ToolCall { input_json, .. }, Delta::ToolInput(chunk)) => {
                input_json.push_str(chunk)
            }
            (_, delta) => warn!(?delta, "Ignoring delta that does not match its block"),
        }
    }

    fn finish(self) -> ContentBlock {
        match self {
            PartialBlock::Reasoning { text, continuation } => {
                ContentBlock::Reasoning { text, continuation }
            }
            PartialBlock::Redacted { data } => ContentBlock::RedactedReasoning { data },
            PartialBlock::Answer { text } => ContentBlock::Answer { text },
            PartialBlock::ToolCall {
                id,
                name,
                input_json,
            } => {
                let input = parse_tool_input(&name, &input_json);
                ContentBlock::ToolCall { id, name, input }
            }
        }
    }
}

fn parse_tool_input(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(tool, %err, "Tool input is not valid JSON, passing raw text");
            Value::String(raw.to_string())
        }
    }
}

/// Accumulates block chunks keyed by stream index.
#[derive(Debug, Default)]
pub struct TurnAssembler {
    open: BTreeMap<usize, PartialBlock>,
    finished: BTreeMap<usize, ContentBlock>,
}

impl TurnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk. `Finished` chunks are ignored here; use [`Self::finish`].
    pub fn push(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::BlockStart { index, kind } => {
                self.open.insert(*index, PartialBlock::start(kind));
            }
            StreamChunk::BlockDelta { index, delta } => match self.open.get_mut(index) {
                Some(block) => block.apply(delta),
                None => warn!(index, "Delta for unknown block index"),
            },
            StreamChunk::BlockStop { index } => {
                if let Some(block) = self.open.remove(index) {
                    self.finished.insert(*index, block.finish());
                }
            }
            StreamChunk::Finished(_) => {}
        }
    }

    /// A block that has already received its stop chunk.
    pub fn finished_block(&self, index: usize) -> Option<&ContentBlock> {
        self.finished.get(&index)
    }

    /// Close any blocks left open and build the turn summary.
    pub fn finish(mut self, usage: Usage, stop_reason: StopReason) -> TurnSummary {
        for (index, block) in std::mem::take(&mut self.open) {
            self.finished.insert(index, block.finish());
        }
        TurnSummary {
            usage,
            stop_reason,
            blocks: self.finished.into_values().collect(),
        }
    }
}

/// Expand finished blocks into the chunk sequence a backend would stream.
///
/// Text is split into pieces of at most `piece_chars` characters.
pub fn chunks_for_blocks(
    blocks: &[ContentBlock],
    usage: Usage,
    stop_reason: StopReason,
    piece_chars: usize,
) -> Vec<StreamChunk> {
    let piece_chars = piece_chars.max(1);
    let mut chunks = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        let (kind, deltas) = match block {
            ContentBlock::Reasoning { text, continuation } => {
                let mut deltas: Vec<Delta> = split(text, piece_chars)
                    .into_iter()
                    .map(Delta::Reasoning)
                    .collect();
                if let Some(token) = continuation {
                    deltas.push(Delta::Continuation(token.clone()));
                }
                (BlockKind::Reasoning, deltas)
            }
            ContentBlock::RedactedReasoning { data } => {
                (BlockKind::RedactedReasoning { data: data.clone() }, Vec::new())
            }
            ContentBlock::Answer { text } => (
                BlockKind::Answer,
                split(text, piece_chars)
                    .into_iter()
                    .map(Delta::Answer)
                    .collect(),
            ),
            ContentBlock::ToolCall { id, name, input } => (
                BlockKind::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                },
                vec![Delta::ToolInput(input.to_string())],
            ),
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => continue,
        };
        chunks.push(StreamChunk::BlockStart { index, kind });
        chunks.extend(
            deltas
                .into_iter()
                .map(|delta| StreamChunk::BlockDelta { index, delta }),
        );
        chunks.push(StreamChunk::BlockStop { index });
    }
    chunks.push(StreamChunk::Finished(TurnSummary {
        usage,
        stop_reason,
        blocks: blocks.to_vec(),
    }));
    chunks
}

fn split(text: &str, piece_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(piece_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}
