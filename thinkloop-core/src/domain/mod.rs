//! Plain data shared by every layer: conversation blocks, usage counters,
//! and engine events.

pub mod blocks;
pub mod events;
pub mod usage;

pub use blocks::{
    ContentBlock, Conversation, ConversationError, Role, ToolCallRecord, ToolDefinition, Turn,
};
pub use events::{EngineEvent, StreamEvent};
pub use usage::{Usage, UsageAccumulator, UsageTotals};
