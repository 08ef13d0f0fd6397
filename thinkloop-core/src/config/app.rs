use super::backend::BackendConfig;
use super::error::ConfigError;
use crate::application::budget::ContextBudget;
use crate::application::profiles::TaskProfile;
use crate::constants::{DEFAULT_EVENT_BUFFER, DEFAULT_MAX_TURNS, TOOL_PREVIEW_CHARS, TOOL_RESULT_CAP};
use std::collections::BTreeMap;
use std::path::Path;
use thinkloop_session::DEFAULT_MAX_MESSAGES;

/// Engine-wide knobs that are not specific to one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_turns: usize,
    pub tool_result_cap: usize,
    pub tool_preview_chars: usize,
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            tool_result_cap: TOOL_RESULT_CAP,
            tool_preview_chars: TOOL_PREVIEW_CHARS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Application configuration loaded from thinkloop.toml
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub budget: ContextBudget,
    pub engine: EngineSettings,
    pub session_max_messages: usize,
    pub profiles: BTreeMap<String, TaskProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            budget: ContextBudget::default(),
            engine: EngineSettings::default(),
            session_max_messages: DEFAULT_MAX_MESSAGES,
            profiles: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file path (or default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        super::loader::parse_config(content, Path::new("<inline>"))
    }

    /// Resolve a profile: configured profiles shadow the built-in presets.
    pub fn profile(&self, name: &str) -> Result<TaskProfile, ConfigError> {
        self.profiles
            .get(name)
            .cloned()
            .or_else(|| TaskProfile::preset(name))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.to_string(),
            })
    }
}
