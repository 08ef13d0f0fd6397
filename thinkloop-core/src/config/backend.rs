use crate::constants::{
    DEFAULT_API_KEY_VAR, DEFAULT_API_VERSION, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_PROVIDER_ID,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use serde::Deserialize;
use std::env;
use tracing::warn;

/// Connection settings for the model-streaming backend.
///
/// # Example
///
/// ```toml
/// [backend]
/// endpoint = "https://api.anthropic.com"
/// api_key = "${ANTHROPIC_API_KEY}"
/// model = "claude-sonnet-4-5"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub provider_id: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_version: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: env::var(DEFAULT_API_KEY_VAR).ok(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct RawBackend {
    pub provider_id: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub model: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Expand `${VAR}` references. Unset variables resolve to `None`.
pub fn expand_value(field: &str, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match shellexpand::env(trimmed) {
        Ok(value) => Some(value.into_owned()),
        Err(err) => {
            warn!(field, var = %err.var_name, "Configuration references an unset variable");
            None
        }
    }
}

/// An explicit key wins; otherwise fall back to the conventional variable.
pub fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    match configured {
        Some(raw) => expand_value("api_key", raw),
        None => env::var(DEFAULT_API_KEY_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty()),
    }
}

impl RawBackend {
    pub(super) fn into_config(self, model: String) -> BackendConfig {
        let defaults = BackendConfig::default();
        BackendConfig {
            provider_id: self.provider_id.unwrap_or(defaults.provider_id),
            endpoint: self
                .endpoint
                .as_deref()
                .and_then(|raw| expand_value("endpoint", raw))
                .unwrap_or(defaults.endpoint),
            api_key: resolve_api_key(self.api_key.as_deref()),
            api_version: self.api_version.unwrap_or(defaults.api_version),
            model,
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        }
    }
}
