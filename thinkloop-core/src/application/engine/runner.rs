use super::errors::EngineError;
use super::models::{FinalizeMode, RunOptions, RunOutcome, Task};
use crate::application::budget::ContextBudget;
use crate::application::events::EventEmitter;
use crate::application::parser::parse_structured;
use crate::application::profiles::TaskProfile;
use crate::application::tooling::{ToolDispatcher, ToolRegistry};
use crate::config::{AppConfig, EngineSettings};
use crate::constants::FINALIZE_INSTRUCTION;
use crate::domain::{
    ContentBlock, Conversation, EngineEvent, ToolCallRecord, ToolDefinition, Turn, Usage,
};
use crate::infrastructure::model::{
    BlockKind, Delta, ModelBackend, ModelError, StopReason, StreamChunk, TurnAssembler,
    TurnRequest, TurnSummary,
};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drives one operation: model turns, tool dispatch, budget checks, events.
pub struct Engine<B: ModelBackend + ?Sized> {
    backend: Arc<B>,
    model: String,
    budget: ContextBudget,
    settings: EngineSettings,
}

impl<B: ModelBackend + ?Sized> Clone for Engine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            model: self.model.clone(),
            budget: self.budget,
            settings: self.settings,
        }
    }
}

/// Mutable state of one run, kept outside the loop so a failure still
/// reports what was gathered.
#[derive(Default)]
struct RunState {
    thinking: String,
    /// Reasoning characters streamed so far, across turns.
    streamed_thinking: usize,
    answer: String,
    usage: Usage,
    turns: usize,
    tool_log: Vec<ToolCallRecord>,
    conversation: Conversation,
}

struct OpenBlock {
    kind: BlockKind,
    chars: usize,
}

impl<B: ModelBackend + ?Sized> Engine<B> {
    pub fn new(backend: Arc<B>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            budget: ContextBudget::default(),
            settings: EngineSettings::default(),
        }
    }

    pub fn from_config(backend: Arc<B>, config: &AppConfig) -> Self {
        Self {
            backend,
            model: config.backend.model.clone(),
            budget: config.budget,
            settings: config.engine,
        }
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `task` to completion. Never fails: backend errors come back as
    /// `success == false`, tool errors are fed to the model, and malformed
    /// answers leave `parsed` empty.
    pub async fn run(&self, task: Task, tools: &ToolRegistry, options: RunOptions) -> RunOutcome {
        info!(
            profile = %options.profile.name,
            backend = %self.backend.id(),
            model = %self.model,
            "Engine run started"
        );
        let mut state = RunState::default();
        let result = self.drive(task, tools, &options, &mut state).await;

        if let Some(accumulator) = &options.usage_accumulator {
            accumulator.record(state.usage, state.thinking.chars().count());
        }

        let RunState {
            thinking,
            streamed_thinking: _,
            answer,
            usage,
            turns,
            tool_log,
            conversation,
        } = state;

        match result {
            Ok(()) => {
                let parsed = parse_structured(&answer);
                if parsed.is_none() && !answer.trim().is_empty() {
                    debug!("Final answer is not structured; returning raw text only");
                }
                options
                    .emitter
                    .emit(EngineEvent::Complete {
                        thinking_length: thinking.chars().count(),
                        response_length: answer.chars().count(),
                        success: true,
                        usage,
                    })
                    .await;
                info!(
                    turns,
                    tool_calls = tool_log.len(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Engine run finished"
                );
                RunOutcome {
                    success: true,
                    thinking,
                    answer,
                    parsed,
                    usage,
                    tool_log,
                    turns,
                    error: None,
                    conversation,
                }
            }
            Err(err) => {
                error!(turns, error = %err, "Engine run failed");
                let message = err.to_string();
                options
                    .emitter
                    .emit(EngineEvent::Error {
                        error: message.clone(),
                    })
                    .await;
                RunOutcome {
                    success: false,
                    thinking,
                    answer,
                    parsed: None,
                    usage,
                    tool_log,
                    turns,
                    error: Some(message),
                    conversation,
                }
            }
        }
    }

    async fn drive(
        &self,
        task: Task,
        tools: &ToolRegistry,
        options: &RunOptions,
        state: &mut RunState,
    ) -> Result<(), EngineError> {
        let profile = &options.profile;
        let emitter = &options.emitter;
        profile.validate().map_err(EngineError::InvalidBudget)?;
        self.budget.validate().map_err(EngineError::InvalidBudget)?;

        let registry = match &profile.tools {
            Some(names) => tools.subset(names),
            None => tools.clone(),
        };
        let mut dispatcher = ToolDispatcher::new(registry).with_cap(self.settings.tool_result_cap);
        let definitions = dispatcher.definitions();
        let mut turn_limit = profile.max_turns.unwrap_or(self.settings.max_turns).max(1);

        let Task {
            system,
            content,
            images,
            history,
        } = task;
        let initial = self
            .budget
            .truncate_initial(&system, &history, &content, &images, &definitions);
        if initial.truncated {
            warn!(profile = %profile.name, "Initial content truncated to fit the context window");
        }
        state.conversation = Conversation::from_turns(history);
        state
            .conversation
            .push_user_with_images(initial.content, images);

        let mut turn = 0;
        loop {
            if turn > 0
                && turn + 1 < turn_limit
                && self
                    .budget
                    .exceeds_inner(&system, state.conversation.turns(), &definitions)
            {
                info!(turn, "Context nearly full, forcing this turn to be the last");
                turn_limit = turn + 1;
            }

            let mode = FinalizeMode::decide(
                turn + 1 >= turn_limit,
                state.conversation.has_tool_call(),
            );
            let request = self.build_request(
                profile,
                &system,
                state.conversation.turns(),
                &definitions,
                mode,
            );
            debug!(turn, ?mode, history = request.turns.len(), "Submitting turn");

            let summary = self
                .stream_turn(request, emitter, &mut state.streamed_thinking)
                .await?;
            state.turns += 1;
            state.usage.add(summary.usage);
            if let Some(on_usage) = &options.on_usage {
                on_usage(state.usage);
            }
            emitter
                .emit(EngineEvent::TurnComplete {
                    turn: state.turns,
                    usage: state.usage,
                })
                .await;

            let stop_reason = summary.stop_reason;
            let mut blocks = summary.blocks;
            if stop_reason == StopReason::BudgetExhausted {
                let before = blocks.len();
                blocks.retain(|block| {
                    !matches!(block, ContentBlock::ToolCall { input, .. } if !input.is_object())
                });
                if blocks.len() < before {
                    warn!(
                        turn,
                        dropped = before - blocks.len(),
                        "Output budget ran out inside a tool call; dropping the partial call"
                    );
                }
            }
            let assistant = Turn::assistant(blocks);
            let reasoning = assistant.reasoning_text();
            if !reasoning.is_empty() {
                if !state.thinking.is_empty() {
                    state.thinking.push_str("\n\n");
                }
                state.thinking.push_str(&reasoning);
            }
            state.answer = assistant.answer_text();
            let calls: Vec<(String, String, Value)> = assistant
                .tool_calls()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            state.conversation.push_assistant(assistant.blocks);

            // Only a turn that stopped to request tools continues the loop.
            if calls.is_empty() || stop_reason != StopReason::ToolRequested {
                if !calls.is_empty() {
                    info!(
                        turn,
                        ?stop_reason,
                        skipped = calls.len(),
                        "Turn did not stop for tools; not executing them"
                    );
                }
                break;
            }
            if mode.is_forced() {
                info!(
                    turn,
                    skipped = calls.len(),
                    "Final turn requested tools; not executing them"
                );
                break;
            }

            let mut results = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                let result = dispatcher.execute(&name, input).await;
                emitter
                    .emit(EngineEvent::ToolResult {
                        id: id.clone(),
                        name,
                        preview: result.preview(self.settings.tool_preview_chars),
                        result_length: result.content.chars().count(),
                        truncated: result.truncated,
                    })
                    .await;
                results.push(ContentBlock::ToolResult {
                    tool_call_id: id,
                    content: result.content,
                    truncated: result.truncated,
                });
            }
            state.tool_log = dispatcher.log().to_vec();
            state.conversation.push_tool_results(results)?;
            turn += 1;
        }
        Ok(())
    }

    fn build_request(
        &self,
        profile: &TaskProfile,
        system: &str,
        turns: &[Turn],
        definitions: &[ToolDefinition],
        mode: FinalizeMode,
    ) -> TurnRequest {
        let declared = (!definitions.is_empty()).then(|| definitions.to_vec());
        let (system, tools) = match mode {
            FinalizeMode::Free => (system.to_string(), declared),
            FinalizeMode::KeepToolsWithInstruction => {
                let framed = if system.trim().is_empty() {
                    FINALIZE_INSTRUCTION.to_string()
                } else {
                    format!("{system}\n\n{FINALIZE_INSTRUCTION}")
                };
                (framed, declared)
            }
            FinalizeMode::OmitTools => (system.to_string(), None),
        };
        TurnRequest {
            model: self.model.clone(),
            max_output_tokens: profile.max_output_tokens(),
            reasoning_budget_tokens: profile.thinking_budget,
            system,
            turns: turns.to_vec(),
            tools,
        }
    }

    /// Consume one turn's stream, forwarding events in stream order.
    ///
    /// `streamed_thinking` carries the reasoning length across turns so that
    /// `thinking_complete` reports the run's running total.
    async fn stream_turn(
        &self,
        request: TurnRequest,
        emitter: &EventEmitter,
        streamed_thinking: &mut usize,
    ) -> Result<TurnSummary, ModelError> {
        let mut stream = self.backend.open_turn(request).await?;
        let mut assembler = TurnAssembler::new();
        let mut open: HashMap<usize, OpenBlock> = HashMap::new();
        let mut summary = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            assembler.push(&chunk);
            match chunk {
                StreamChunk::BlockStart { index, kind } => {
                    let event = match &kind {
                        // opaque, nothing to show
                        BlockKind::RedactedReasoning { .. } => continue,
                        BlockKind::Reasoning => EngineEvent::ThinkingStarted,
                        BlockKind::Answer => EngineEvent::ResponseStarted,
                        BlockKind::ToolCall { id, name } => EngineEvent::ToolCallStarted {
                            id: id.clone(),
                            name: name.clone(),
                        },
                    };
                    open.insert(index, OpenBlock { kind, chars: 0 });
                    emitter.emit(event).await;
                }
                StreamChunk::BlockDelta { index, delta } => {
                    let Some(block) = open.get_mut(&index) else {
                        continue;
                    };
                    let event = match (&block.kind, delta) {
                        (_, Delta::Reasoning(text)) => {
                            block.chars += text.chars().count();
                            EngineEvent::ThinkingDelta { text }
                        }
                        (_, Delta::Answer(text)) => {
                            block.chars += text.chars().count();
                            EngineEvent::ResponseDelta { text }
                        }
                        (BlockKind::ToolCall { id, .. }, Delta::ToolInput(partial_json)) => {
                            EngineEvent::ToolInputDelta {
                                id: id.clone(),
                                partial_json,
                            }
                        }
                        // continuation tokens stay internal
                        _ => continue,
                    };
                    emitter.emit(event).await;
                }
                StreamChunk::BlockStop { index } => {
                    let Some(block) = open.remove(&index) else {
                        continue;
                    };
                    let event = match block.kind {
                        BlockKind::Reasoning => {
                            *streamed_thinking += block.chars;
                            EngineEvent::ThinkingComplete {
                                total_length: *streamed_thinking,
                            }
                        }
                        BlockKind::RedactedReasoning { .. } => continue,
                        BlockKind::Answer => EngineEvent::ResponseComplete {
                            total_length: block.chars,
                        },
                        BlockKind::ToolCall { id, name } => {
                            let input = match assembler.finished_block(index) {
                                Some(ContentBlock::ToolCall { input, .. }) => input.clone(),
                                _ => Value::Null,
                            };
                            EngineEvent::ToolCall { id, name, input }
                        }
                    };
                    emitter.emit(event).await;
                }
                StreamChunk::Finished(turn_summary) => {
                    summary = Some(turn_summary);
                    break;
                }
            }
        }

        let mut summary = summary.ok_or_else(|| {
            ModelError::invalid_response(
                self.backend.id(),
                "stream ended before the turn summary",
            )
        })?;
        if summary.blocks.is_empty() {
            summary.blocks = assembler
                .finish(summary.usage, summary.stop_reason)
                .blocks;
        }
        Ok(summary)
    }
}
