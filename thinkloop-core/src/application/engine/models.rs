use crate::application::events::{EventEmitter, EventSink};
use crate::application::profiles::TaskProfile;
use crate::domain::{ContentBlock, Conversation, ToolCallRecord, Turn, Usage, UsageAccumulator};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// System framing, the new user content, and optional prior turns.
#[derive(Debug, Clone, Default)]
pub struct Task {
    pub system: String,
    pub content: String,
    /// Image blocks sent after `content` in the same user turn.
    pub images: Vec<ContentBlock>,
    pub history: Vec<Turn>,
}

impl Task {
    pub fn new(system: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            content: content.into(),
            images: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Attach a base64-encoded image, e.g. `image/png`.
    pub fn with_image(mut self, media_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.images.push(ContentBlock::image(media_type, data));
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }
}

/// Receives cumulative usage after every turn.
pub type UsageCallback = Arc<dyn Fn(Usage) + Send + Sync>;

#[derive(Clone)]
pub struct RunOptions {
    pub profile: TaskProfile,
    pub emitter: EventEmitter,
    pub on_usage: Option<UsageCallback>,
    /// Caller-owned totals, updated once when the operation ends.
    pub usage_accumulator: Option<UsageAccumulator>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("profile", &self.profile.name)
            .field("emitter", &self.emitter)
            .field("on_usage", &self.on_usage.is_some())
            .field("usage_accumulator", &self.usage_accumulator.is_some())
            .finish()
    }
}

impl RunOptions {
    pub fn new(profile: TaskProfile) -> Self {
        Self {
            profile,
            emitter: EventEmitter::disabled(),
            on_usage: None,
            usage_accumulator: None,
        }
    }

    /// Stream events to `sink`, named with the profile's event prefix.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.emitter = EventEmitter::new(sink, self.profile.event_prefix.clone());
        self
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn on_usage<F>(mut self, callback: F) -> Self
    where
        F: Fn(Usage) + Send + Sync + 'static,
    {
        self.on_usage = Some(Arc::new(callback));
        self
    }

    pub fn with_accumulator(mut self, accumulator: UsageAccumulator) -> Self {
        self.usage_accumulator = Some(accumulator);
        self
    }
}

/// What one operation produced. `run` always returns one of these; a
/// backend failure shows up as `success == false` with `error` set.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub success: bool,
    /// Reasoning text of every turn, in order.
    pub thinking: String,
    /// Answer text of the final turn.
    pub answer: String,
    pub parsed: Option<Value>,
    pub usage: Usage,
    pub tool_log: Vec<ToolCallRecord>,
    /// Model calls made.
    pub turns: usize,
    pub error: Option<String>,
    /// Full history including the final assistant turn, for callers that persist it.
    pub conversation: Conversation,
}

impl RunOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// How a request treats tool declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Tools declared; the model may call them.
    Free,
    /// History references tools, so they stay declared, but the system text
    /// tells the model to answer now.
    KeepToolsWithInstruction,
    /// No tool has been called yet, so declarations are dropped.
    OmitTools,
}

impl FinalizeMode {
    /// Forced-finalization rule. A history containing `tool_use` blocks must
    /// keep its tools declared on the Messages API.
    pub fn decide(force_finalize: bool, history_has_tool_call: bool) -> Self {
        match (force_finalize, history_has_tool_call) {
            (false, _) => FinalizeMode::Free,
            (true, true) => FinalizeMode::KeepToolsWithInstruction,
            (true, false) => FinalizeMode::OmitTools,
        }
    }

    pub fn is_forced(self) -> bool {
        self != FinalizeMode::Free
    }
}
