use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required field 'model' in [backend]")]
    MissingModel,

    #[error("invalid backend configuration: {reason}")]
    InvalidBackend { reason: String },

    #[error("invalid budget configuration: {reason}")]
    InvalidBudget { reason: String },

    #[error("profile '{profile}' is invalid: {reason}")]
    InvalidProfile { profile: String, reason: String },

    #[error("profile '{profile}' is not configured")]
    UnknownProfile { profile: String },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::NotFound { path } => {
                format!("No configuration file at {}.", path.display())
            }
            ConfigError::Io { path, .. } => {
                format!("Configuration at {} could not be read.", path.display())
            }
            ConfigError::Parse { path, source } => {
                format!("Configuration at {} is not valid TOML: {source}", path.display())
            }
            ConfigError::MissingModel => {
                "Set `model` in the [backend] section of the configuration.".to_string()
            }
            ConfigError::InvalidBackend { reason } => {
                format!("The [backend] section is invalid: {reason}.")
            }
            ConfigError::InvalidBudget { reason } => {
                format!("The [budget] section is invalid: {reason}.")
            }
            ConfigError::InvalidProfile { profile, reason } => {
                format!("Profile '{profile}' is invalid: {reason}.")
            }
            ConfigError::UnknownProfile { profile } => {
                format!("No profile named '{profile}' is configured or built in.")
            }
        }
    }
}
