//! Model infrastructure module
//!
//! The model-streaming boundary and its HTTP implementation.
//!
//! # Structure
//! - `types` - Request, streamed chunk, summary, and error types
//! - `traits` - The `ModelBackend` trait
//! - `assembler` - Folds chunks back into content blocks
//! - `clients` - SSE and scripted backend implementations

pub mod assembler;
pub mod clients;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use assembler::{TurnAssembler, chunks_for_blocks};
pub use clients::{AnthropicClient, ScriptedBackend};
pub use traits::ModelBackend;
pub use types::{
    BlockKind, ChunkStream, Delta, ModelError, StopReason, StreamChunk, TurnRequest, TurnSummary,
};
