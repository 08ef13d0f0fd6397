//! Event delivery from the engine to whoever is watching.
//!
//! The engine writes [`EngineEvent`]s through an [`EventEmitter`]; a sink
//! decides where they go (a bounded channel for a transport, a closure for
//! logs and tests). Emission is awaited in stream order and never feeds back
//! into control flow.

use crate::domain::{EngineEvent, StreamEvent};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: StreamEvent);
}

/// Forwards events into a bounded channel. A full channel applies
/// backpressure; a closed one drops events.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<StreamEvent>) -> Self {
        Self { sender }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: StreamEvent) {
        if let Err(err) = self.sender.send(event).await {
            trace!(event = %err.0.name, "Event receiver closed, dropping event");
        }
    }
}

/// Calls a synchronous closure for every event.
pub struct FnSink<F> {
    callback: F,
}

impl<F> FnSink<F>
where
    F: Fn(StreamEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventSink for FnSink<F>
where
    F: Fn(StreamEvent) + Send + Sync,
{
    async fn emit(&self, event: StreamEvent) {
        (self.callback)(event);
    }
}

/// Optional sink plus the name prefix for one operation's events.
#[derive(Clone, Default)]
pub struct EventEmitter {
    sink: Option<Arc<dyn EventSink>>,
    prefix: String,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("enabled", &self.sink.is_some())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>, prefix: impl Into<String>) -> Self {
        Self {
            sink: Some(sink),
            prefix: prefix.into(),
        }
    }

    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Same sink, different prefix.
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self {
            sink: self.sink.clone(),
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(StreamEvent::new(&self.prefix, &event)).await;
        }
    }
}
