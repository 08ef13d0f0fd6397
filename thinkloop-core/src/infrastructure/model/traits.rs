//! Model traits

use super::types::{ChunkStream, ModelError, TurnRequest};
use async_trait::async_trait;

/// The model-streaming boundary.
///
/// An implementation yields block start/delta/stop chunks in stream order and
/// ends with exactly one [`StreamChunk::Finished`](super::types::StreamChunk)
/// summary. Retries, if any, belong to the implementation.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Identifier used in logs and error messages.
    fn id(&self) -> &str;

    async fn open_turn(&self, request: TurnRequest) -> Result<ChunkStream, ModelError>;
}
