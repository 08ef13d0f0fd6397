//! # thinkloop-core
//!
//! Turn executor for reasoning models that stream a visible thinking trace,
//! call tools mid-conversation, and must stay inside a fixed context window.
//!
//! ```no_run
//! use std::sync::Arc;
//! use thinkloop_core::application::{Engine, RunOptions, Task, TaskProfile, ToolRegistry};
//! use thinkloop_core::config::AppConfig;
//! use thinkloop_core::infrastructure::model::AnthropicClient;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! let backend = Arc::new(AnthropicClient::from_config(&config.backend));
//! let engine = Engine::from_config(backend, &config);
//! let profile = config.profile("deep_analysis")?;
//! let outcome = engine
//!     .run(
//!         Task::new("You are a careful analyst.", "Summarise the filing."),
//!         &ToolRegistry::new(),
//!         RunOptions::new(profile),
//!     )
//!     .await;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{
    ChatService, Engine, EngineError, RunOptions, RunOutcome, Task, TaskProfile, ToolRegistry,
};
pub use config::{AppConfig, ConfigError};
pub use domain::{ContentBlock, StreamEvent, ToolDefinition, Usage, UsageAccumulator};
pub use infrastructure::model::{AnthropicClient, ModelBackend, ModelError};
