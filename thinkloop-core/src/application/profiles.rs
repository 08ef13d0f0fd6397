use serde::{Deserialize, Serialize};

/// Token budgets and tool exposure for one kind of task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProfile {
    pub name: String,
    /// Tokens the model may spend reasoning.
    pub thinking_budget: u32,
    /// Headroom for the answer on top of the reasoning budget.
    pub answer_tokens: u32,
    /// Overrides the engine-wide turn limit.
    pub max_turns: Option<usize>,
    /// Curated subset of tool names; `None` exposes every registered tool.
    pub tools: Option<Vec<String>>,
    pub event_prefix: String,
}

/// (name, thinking budget, answer headroom)
const PRESETS: &[(&str, u32, u32)] = &[
    ("health_check", 60_000, 16_384),
    ("deep_analysis", 40_000, 16_384),
    ("adversarial", 30_000, 16_384),
    ("judge", 20_000, 8_192),
    ("motion", 20_000, 64_000),
    ("evidence", 20_000, 8_192),
    ("chat", 30_000, 8_192),
    ("hearing_prep", 10_000, 4_096),
    ("client_letter", 10_000, 8_192),
    ("cascade_summary", 30_000, 16_384),
    ("smart_actions", 5_000, 4_096),
    ("widget", 20_000, 8_192),
];

impl TaskProfile {
    pub fn new(name: impl Into<String>, thinking_budget: u32, answer_tokens: u32) -> Self {
        let name = name.into();
        Self {
            event_prefix: name.clone(),
            name,
            thinking_budget,
            answer_tokens,
            max_turns: None,
            tools: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_event_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_prefix = prefix.into();
        self
    }

    /// `max_tokens` for the request: reasoning budget plus answer headroom.
    pub fn max_output_tokens(&self) -> u32 {
        self.thinking_budget.saturating_add(self.answer_tokens)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.thinking_budget == 0 {
            return Err("thinking_budget must be greater than zero".into());
        }
        if self.answer_tokens == 0 {
            return Err("answer_tokens must be greater than zero".into());
        }
        if self.max_turns == Some(0) {
            return Err("max_turns must be at least 1".into());
        }
        Ok(())
    }

    /// Built-in profile by name.
    pub fn preset(name: &str) -> Option<Self> {
        PRESETS
            .iter()
            .find(|(preset, _, _)| *preset == name)
            .map(|(preset, thinking, answer)| Self::new(*preset, *thinking, *answer))
    }

    pub fn preset_names() -> impl Iterator<Item = &'static str> {
        PRESETS.iter().map(|(name, _, _)| *name)
    }
}
