//! In-memory backend that replays a fixed script of turns.

use crate::domain::{ContentBlock, Usage};
use crate::infrastructure::model::assembler::chunks_for_blocks;
use crate::infrastructure::model::traits::ModelBackend;
use crate::infrastructure::model::types::{
    ChunkStream, ModelError, StopReason, StreamChunk, TurnRequest,
};
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const PIECE_CHARS: usize = 8;

#[derive(Debug, Clone)]
enum ScriptStep {
    Turn {
        blocks: Vec<ContentBlock>,
        usage: Usage,
        stop_reason: StopReason,
    },
    Refuse(String),
    BreakAfterStart(Vec<ContentBlock>, String),
}

/// Replays scripted turns in order and records every request it receives.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    id: String,
    script: Arc<Mutex<VecDeque<ScriptStep>>>,
    requests: Arc<Mutex<Vec<TurnRequest>>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            id: "scripted".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push(&self, step: ScriptStep) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    /// Queue a turn. The stop reason is `ToolRequested` when any block is a
    /// tool call, `NaturalEnd` otherwise.
    pub fn respond(&self, blocks: Vec<ContentBlock>, usage: Usage) -> &Self {
        let stop_reason = if blocks.iter().any(ContentBlock::is_tool_call) {
            StopReason::ToolRequested
        } else {
            StopReason::NaturalEnd
        };
        self.respond_with(blocks, usage, stop_reason)
    }

    pub fn respond_with(
        &self,
        blocks: Vec<ContentBlock>,
        usage: Usage,
        stop_reason: StopReason,
    ) -> &Self {
        self.push(ScriptStep::Turn {
            blocks,
            usage,
            stop_reason,
        });
        self
    }

    /// Queue a turn that is rejected before any chunk is streamed.
    pub fn refuse(&self, message: impl Into<String>) -> &Self {
        self.push(ScriptStep::Refuse(message.into()));
        self
    }

    /// Queue a turn that streams `blocks` and then fails before its summary.
    pub fn break_mid_stream(&self, blocks: Vec<ContentBlock>, message: impl Into<String>) -> &Self {
        self.push(ScriptStep::BreakAfterStart(blocks, message.into()));
        self
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open_turn(&self, request: TurnRequest) -> Result<ChunkStream, ModelError> {
        request.validate()?;
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let step = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        debug!(backend = %self.id, scripted = step.is_some(), "Replaying scripted turn");

        let items: Vec<Result<StreamChunk, ModelError>> = match step {
            Some(ScriptStep::Turn {
                blocks,
                usage,
                stop_reason,
            }) => chunks_for_blocks(&blocks, usage, stop_reason, PIECE_CHARS)
                .into_iter()
                .map(Ok)
                .collect(),
            Some(ScriptStep::Refuse(message)) => {
                return Err(ModelError::api(
                    &self.id,
                    "overloaded_error",
                    message,
                ));
            }
            Some(ScriptStep::BreakAfterStart(blocks, message)) => {
                let mut items: Vec<_> =
                    chunks_for_blocks(&blocks, Usage::default(), StopReason::NaturalEnd, PIECE_CHARS)
                        .into_iter()
                        .filter(|chunk| !matches!(chunk, StreamChunk::Finished(_)))
                        .map(Ok)
                        .collect();
                items.push(Err(ModelError::stream(&self.id, message)));
                items
            }
            None => {
                return Err(ModelError::invalid_response(
                    &self.id,
                    "script has no turns left",
                ));
            }
        };
        Ok(Box::pin(stream::iter(items)))
    }
}
