//! Engine-level services built on the domain types and a model backend.

pub mod budget;
pub mod chat;
pub mod engine;
pub mod events;
pub mod parser;
pub mod pipeline;
pub mod profiles;
pub mod tooling;

pub use budget::{ContextBudget, Truncation};
pub use chat::ChatService;
pub use engine::{Engine, EngineError, FinalizeMode, RunOptions, RunOutcome, Task};
pub use events::{ChannelSink, EventEmitter, EventSink, FnSink};
pub use parser::parse_structured;
pub use pipeline::{Phase, PhaseOutcome, Pipeline, PipelineOutcome, spawn_with_deadline};
pub use profiles::TaskProfile;
pub use tooling::{
    DispatchResult, FnTool, ToolDispatcher, ToolError, ToolHandler, ToolRegistry,
};
