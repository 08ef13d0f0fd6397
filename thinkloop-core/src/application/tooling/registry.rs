use super::error::ToolError;
use super::interface::ToolHandler;
use crate::domain::ToolDefinition;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The declared tool set of one operation. Every declared tool has exactly
/// one handler because definitions come from the handlers themselves.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_handlers<I>(handlers: I) -> Result<Self, ToolError>
    where
        I: IntoIterator<Item = Arc<dyn ToolHandler>>,
    {
        let mut registry = Self::new();
        for handler in handlers {
            registry.register(handler)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), ToolError> {
        let name = handler.definition().name;
        if self.handlers.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        debug!(tool = %name, "Registered tool handler");
        self.order.push(name.clone());
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|handler| handler.definition())
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// A curated view exposing only `names`, in registration order.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let wanted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        for name in &wanted {
            if !self.handlers.contains_key(*name) {
                warn!(tool = %name, "Requested tool is not registered");
            }
        }
        let order: Vec<String> = self
            .order
            .iter()
            .filter(|name| wanted.contains(&name.as_str()))
            .cloned()
            .collect();
        let handlers = order
            .iter()
            .filter_map(|name| {
                self.handlers
                    .get(name)
                    .map(|handler| (name.clone(), Arc::clone(handler)))
            })
            .collect();
        Self { order, handlers }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
