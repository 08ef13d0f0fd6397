use super::engine::{Engine, RunOptions, RunOutcome, Task};
use super::events::{EventEmitter, EventSink};
use super::profiles::TaskProfile;
use super::tooling::ToolRegistry;
use crate::domain::{ContentBlock, Turn, UsageAccumulator};
use crate::infrastructure::model::ModelBackend;
use std::sync::Arc;
use thinkloop_session::{ChatMessage, ChatRole, SessionStore};
use tracing::{debug, info};

/// Follow-up chat over an engine. The first message of a session carries the
/// caller's context; later ones replay the stored history instead.
pub struct ChatService<B: ModelBackend + ?Sized> {
    engine: Engine<B>,
    sessions: SessionStore,
    profile: TaskProfile,
    system: String,
    accumulator: Option<UsageAccumulator>,
}

impl<B: ModelBackend + ?Sized> ChatService<B> {
    pub fn new(
        engine: Engine<B>,
        sessions: SessionStore,
        profile: TaskProfile,
        system: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            sessions,
            profile,
            system: system.into(),
            accumulator: None,
        }
    }

    pub fn with_accumulator(mut self, accumulator: UsageAccumulator) -> Self {
        self.accumulator = Some(accumulator);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Send one message. Only successful exchanges are recorded.
    pub async fn send(
        &self,
        session_id: &str,
        context: &str,
        message: &str,
        tools: &ToolRegistry,
        sink: Option<Arc<dyn EventSink>>,
    ) -> RunOutcome {
        let history = self.sessions.history(session_id);
        let content = if history.is_empty() && !context.trim().is_empty() {
            format!("{context}\n\n---\n\n{message}")
        } else {
            message.to_string()
        };
        debug!(session_id, history = history.len(), "Sending chat message");

        let task = Task::new(self.system.clone(), content.clone())
            .with_history(history.iter().map(message_to_turn).collect());
        let mut options = RunOptions::new(self.profile.clone());
        if let Some(sink) = sink {
            options = options.with_emitter(EventEmitter::new(
                sink,
                self.profile.event_prefix.clone(),
            ));
        }
        if let Some(accumulator) = &self.accumulator {
            options = options.with_accumulator(accumulator.clone());
        }

        let outcome = self.engine.run(task, tools, options).await;
        if outcome.success {
            self.sessions
                .record_exchange(session_id, content, outcome.answer.clone());
        }
        outcome
    }

    /// End a session and drop its history.
    pub fn clear(&self, session_id: &str) -> bool {
        let removed = self.sessions.clear(session_id);
        info!(session_id, removed, "Chat session cleared");
        removed
    }
}

fn message_to_turn(message: &ChatMessage) -> Turn {
    match message.role {
        ChatRole::User => Turn::user(message.content.clone()),
        ChatRole::Assistant => Turn::assistant(vec![ContentBlock::answer(message.content.clone())]),
    }
}
