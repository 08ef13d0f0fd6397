//! Tool dispatch: handler trait, the per-operation registry, and the
//! dispatcher that isolates failures and caps result size.

mod dispatcher;
mod error;
mod interface;
mod registry;

pub use dispatcher::{DispatchResult, ToolDispatcher, cap_result};
pub use error::ToolError;
pub use interface::{FnTool, ToolHandler};
pub use registry::ToolRegistry;
