use super::app::{AppConfig, EngineSettings};
use super::backend::RawBackend;
use super::error::ConfigError;
use crate::application::budget::ContextBudget;
use crate::application::profiles::TaskProfile;
use crate::constants::{CONFIG_PATH, ENV_PATH};
use dotenvy::from_filename;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Once;
use thinkloop_session::DEFAULT_MAX_MESSAGES;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    backend: RawBackend,
    #[serde(default)]
    budget: RawBudget,
    #[serde(default)]
    engine: RawEngine,
    #[serde(default)]
    session: RawSession,
    #[serde(default)]
    profiles: BTreeMap<String, RawProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBudget {
    context_limit: Option<usize>,
    outer_margin: Option<usize>,
    inner_margin: Option<usize>,
    chars_per_token: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawEngine {
    max_turns: Option<usize>,
    tool_result_cap: Option<usize>,
    tool_preview_chars: Option<usize>,
    event_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSession {
    max_messages: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    thinking_budget: u32,
    answer_tokens: u32,
    max_turns: Option<usize>,
    tools: Option<Vec<String>>,
    event_prefix: Option<String>,
}

/// Ensures environment variables are loaded from config/.env
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration from a file path
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    ensure_env_loaded();
    let config_path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
    debug!(path = %config_path.display(), "Reading engine configuration file");

    let content = fs::read_to_string(config_path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: config_path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            }
        }
    })?;

    parse_config(&content, config_path)
}

pub(super) fn parse_config(content: &str, path: &Path) -> Result<AppConfig, ConfigError> {
    let parsed: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate_and_build(parsed)
}

fn validate_and_build(parsed: RawConfig) -> Result<AppConfig, ConfigError> {
    let RawConfig {
        backend,
        budget,
        engine,
        session,
        profiles,
    } = parsed;

    let model = backend
        .model
        .clone()
        .filter(|model| !model.trim().is_empty())
        .ok_or(ConfigError::MissingModel)?;
    let backend = backend.into_config(model);
    if backend.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidBackend {
            reason: "request_timeout_secs must be greater than zero".into(),
        });
    }

    let defaults = ContextBudget::default();
    let budget = ContextBudget {
        limit: budget.context_limit.unwrap_or(defaults.limit),
        outer_margin: budget.outer_margin.unwrap_or(defaults.outer_margin),
        inner_margin: budget.inner_margin.unwrap_or(defaults.inner_margin),
        chars_per_token: budget.chars_per_token.unwrap_or(defaults.chars_per_token),
    };
    budget
        .validate()
        .map_err(|reason| ConfigError::InvalidBudget { reason })?;

    let defaults = EngineSettings::default();
    let engine = EngineSettings {
        max_turns: engine.max_turns.unwrap_or(defaults.max_turns).max(1),
        tool_result_cap: engine.tool_result_cap.unwrap_or(defaults.tool_result_cap),
        tool_preview_chars: engine
            .tool_preview_chars
            .unwrap_or(defaults.tool_preview_chars),
        event_buffer: engine.event_buffer.unwrap_or(defaults.event_buffer).max(1),
    };

    let mut built = BTreeMap::new();
    for (name, raw) in profiles {
        let profile = TaskProfile {
            event_prefix: raw.event_prefix.unwrap_or_else(|| name.clone()),
            name: name.clone(),
            thinking_budget: raw.thinking_budget,
            answer_tokens: raw.answer_tokens,
            max_turns: raw.max_turns,
            tools: raw.tools,
        };
        profile
            .validate()
            .map_err(|reason| ConfigError::InvalidProfile {
                profile: name.clone(),
                reason,
            })?;
        built.insert(name, profile);
    }

    Ok(AppConfig {
        backend,
        budget,
        engine,
        session_max_messages: session.max_messages.unwrap_or(DEFAULT_MAX_MESSAGES),
        profiles: built,
    })
}
