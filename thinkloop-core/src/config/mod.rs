pub mod app;
pub mod backend;
pub mod error;
pub mod loader;

pub use app::{AppConfig, EngineSettings};
pub use backend::{BackendConfig, resolve_api_key};
pub use error::ConfigError;
pub use loader::ensure_env_loaded;
