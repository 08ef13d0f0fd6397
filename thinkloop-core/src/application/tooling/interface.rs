use super::error::ToolError;
use crate::domain::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// A tool the engine can run on the model's behalf.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. The returned string is fed back to the model verbatim,
    /// subject to the dispatcher's size cap.
    async fn call(&self, input: Value) -> Result<String, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnTool<F> {
    definition: ToolDefinition,
    handler: F,
}

impl<F> FnTool<F> {
    pub fn new(definition: ToolDefinition, handler: F) -> Self {
        Self {
            definition,
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ToolError>> + Send,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, input: Value) -> Result<String, ToolError> {
        (self.handler)(input).await
    }
}
