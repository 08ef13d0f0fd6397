//! Streaming client for the Anthropic Messages API with extended thinking.

use super::wire::{
    ContentBlockDelta, ContentBlockStart, ContentBlockStop, MessageDelta, MessageStart,
    MessagesRequest, StreamError, ThinkingConfig, WireBlock, WireDelta, WireUsage, encode_tool,
    encode_turn,
};
use crate::config::BackendConfig;
use crate::domain::Usage;
use crate::infrastructure::model::assembler::TurnAssembler;
use crate::infrastructure::model::traits::ModelBackend;
use crate::infrastructure::model::types::{
    BlockKind, ChunkStream, Delta, ModelError, StopReason, StreamChunk, TurnRequest,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Error as SseError, Event, EventSource, retry::Never};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, trace, warn};

const MESSAGES_PATH: &str = "v1/messages";

#[derive(Clone)]
pub struct AnthropicClient {
    id: String,
    endpoint: String,
    api_key: Option<String>,
    api_version: String,
    idle_timeout: Duration,
    http: Client,
}

impl AnthropicClient {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            id: config.provider_id.clone(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            idle_timeout: Duration::from_secs(config.request_timeout_secs),
            http: Client::new(),
        }
    }

    fn build_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        format!("{base}/{MESSAGES_PATH}")
    }

    fn require_api_key(&self) -> Result<&str, ModelError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::missing_api_key(&self.id))
    }
}

#[async_trait]
impl ModelBackend for AnthropicClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open_turn(&self, request: TurnRequest) -> Result<ChunkStream, ModelError> {
        request.validate()?;
        let api_key = self.require_api_key()?;

        let payload = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_output_tokens,
            thinking: ThinkingConfig::enabled(request.reasoning_budget_tokens),
            system: &request.system,
            messages: request.turns.iter().map(encode_turn).collect(),
            tools: request
                .tools
                .as_ref()
                .map(|tools| tools.iter().map(encode_tool).collect()),
            stream: true,
        };

        info!(
            provider = self.id.as_str(),
            model = request.model.as_str(),
            turns = request.turns.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            max_tokens = request.max_output_tokens,
            thinking_budget = request.reasoning_budget_tokens,
            "Opening streaming turn"
        );

        let builder = self
            .http
            .post(self.build_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", self.api_version.as_str())
            .header("content-type", "application/json")
            .json(&payload);
        let mut source = EventSource::new(builder)
            .map_err(|err| ModelError::stream(&self.id, err.to_string()))?;
        source.set_retry_policy(Box::new(Never));

        let (tx, rx) = mpsc::unbounded_channel();
        let provider = self.id.clone();
        let idle_timeout = self.idle_timeout;
        tokio::spawn(async move {
            pump(provider, source, idle_timeout, tx).await;
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

type ChunkSender = mpsc::UnboundedSender<Result<StreamChunk, ModelError>>;

#[derive(Default)]
struct StreamState {
    assembler: TurnAssembler,
    usage: Usage,
    stop_reason: StopReason,
}

impl StreamState {
    fn merge_usage(&mut self, usage: Option<WireUsage>) {
        let Some(usage) = usage else { return };
        if let Some(input) = usage.input_tokens {
            self.usage.input_tokens = input;
        }
        if let Some(output) = usage.output_tokens {
            self.usage.output_tokens = output;
        }
    }
}

enum Step {
    Emit(Vec<StreamChunk>),
    Done,
    Fail(ModelError),
}

async fn pump(provider: String, mut source: EventSource, idle_timeout: Duration, tx: ChunkSender) {
    let mut state = StreamState::default();
    loop {
        let next = match timeout(idle_timeout, source.next()).await {
            Ok(next) => next,
            Err(_) => {
                error!(provider = provider.as_str(), "Idle timeout waiting for stream event");
                let _ = tx.send(Err(ModelError::stream(&provider, "idle timeout")));
                break;
            }
        };
        let message = match next {
            Some(Ok(Event::Open)) => continue,
            Some(Ok(Event::Message(message))) => message,
            Some(Err(SseError::StreamEnded)) | None => {
                let _ = tx.send(Err(ModelError::stream(
                    &provider,
                    "stream closed before the message completed",
                )));
                break;
            }
            Some(Err(SseError::InvalidStatusCode(status, response))) => {
                let body = response.text().await.unwrap_or_default();
                warn!(provider = provider.as_str(), %status, "Provider rejected request");
                let _ = tx.send(Err(ModelError::api(
                    &provider,
                    format!("http {}", status.as_u16()),
                    body,
                )));
                break;
            }
            Some(Err(SseError::Transport(source))) => {
                let _ = tx.send(Err(ModelError::network(&provider, source)));
                break;
            }
            Some(Err(other)) => {
                let _ = tx.send(Err(ModelError::stream(&provider, other.to_string())));
                break;
            }
        };

        trace!(event = message.event.as_str(), "Stream event");
        match handle_event(&provider, &message.event, &message.data, &mut state) {
            Step::Emit(chunks) => {
                for chunk in chunks {
                    state.assembler.push(&chunk);
                    if tx.send(Ok(chunk)).is_err() {
                        debug!(provider = provider.as_str(), "Receiver dropped, abandoning stream");
                        source.close();
                        return;
                    }
                }
            }
            Step::Done => {
                let StreamState {
                    assembler,
                    usage,
                    stop_reason,
                } = state;
                let summary = assembler.finish(usage, stop_reason);
                debug!(
                    provider = provider.as_str(),
                    blocks = summary.blocks.len(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Stream completed"
                );
                let _ = tx.send(Ok(StreamChunk::Finished(summary)));
                break;
            }
            Step::Fail(err) => {
                let _ = tx.send(Err(err));
                break;
            }
        }
    }
    source.close();
}

fn handle_event(provider: &str, event: &str, data: &str, state: &mut StreamState) -> Step {
    match event {
        "message_start" => match serde_json::from_str::<MessageStart>(data) {
            Ok(start) => {
                state.merge_usage(start.message.usage);
                Step::Emit(Vec::new())
            }
            Err(err) => parse_failure(provider, event, err),
        },
        "content_block_start" => match serde_json::from_str::<ContentBlockStart>(data) {
            Ok(start) => {
                let kind = match start.content_block {
                    WireBlock::Thinking => BlockKind::Reasoning,
                    WireBlock::RedactedThinking { data } => BlockKind::RedactedReasoning { data },
                    WireBlock::Text => BlockKind::Answer,
                    WireBlock::ToolUse { id, name } => BlockKind::ToolCall { id, name },
                    WireBlock::Unknown => {
                        warn!(index = start.index, "Skipping unsupported content block");
                        return Step::Emit(Vec::new());
                    }
                };
                Step::Emit(vec![StreamChunk::BlockStart {
                    index: start.index,
                    kind,
                }])
            }
            Err(err) => parse_failure(provider, event, err),
        },
        "content_block_delta" => match serde_json::from_str::<ContentBlockDelta>(data) {
            Ok(delta) => {
                let mapped = match delta.delta {
                    WireDelta::ThinkingDelta { thinking } => Delta::Reasoning(thinking),
                    WireDelta::TextDelta { text } => Delta::Answer(text),
                    WireDelta::InputJsonDelta { partial_json } => Delta::ToolInput(partial_json),
                    WireDelta::SignatureDelta { signature } => Delta::Continuation(signature),
                    WireDelta::Unknown => return Step::Emit(Vec::new()),
                };
                Step::Emit(vec![StreamChunk::BlockDelta {
                    index: delta.index,
                    delta: mapped,
                }])
            }
            Err(err) => parse_failure(provider, event, err),
        },
        "content_block_stop" => match serde_json::from_str::<ContentBlockStop>(data) {
            Ok(stop) => Step::Emit(vec![StreamChunk::BlockStop { index: stop.index }]),
            Err(err) => parse_failure(provider, event, err),
        },
        "message_delta" => match serde_json::from_str::<MessageDelta>(data) {
            Ok(delta) => {
                state.merge_usage(delta.usage);
                if let Some(reason) = delta.delta.stop_reason.as_deref() {
                    state.stop_reason = StopReason::from_wire(reason);
                }
                Step::Emit(Vec::new())
            }
            Err(err) => parse_failure(provider, event, err),
        },
        "message_stop" => Step::Done,
        "error" => match serde_json::from_str::<StreamError>(data) {
            Ok(failure) => Step::Fail(ModelError::api(
                provider,
                failure.error.kind,
                failure.error.message,
            )),
            Err(err) => parse_failure(provider, event, err),
        },
        _ => Step::Emit(Vec::new()),
    }
}

fn parse_failure(provider: &str, event: &str, err: serde_json::Error) -> Step {
    error!(provider, event, %err, "Failed to decode stream event");
    Step::Fail(ModelError::invalid_response(
        provider,
        format!("undecodable {event} event: {err}"),
    ))
}
