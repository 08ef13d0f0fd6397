//! Backend implementations

mod anthropic;
mod scripted;
mod wire;

pub use anthropic::AnthropicClient;
pub use scripted::ScriptedBackend;
