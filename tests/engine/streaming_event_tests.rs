//! Event delivery through the channel sink while an operation runs.

use serde_json::{Value, json};
use std::sync::Arc;
use thinkloop_core::application::{
    ChannelSink, EventSink, FnTool, RunOptions, Task, TaskProfile, ToolError, ToolHandler,
    ToolRegistry,
};
use thinkloop_core::domain::{ContentBlock, StreamEvent, ToolDefinition, Usage};
use thinkloop_core::infrastructure::model::ScriptedBackend;
use thinkloop_core::Engine;
use tokio::sync::mpsc::Receiver;

fn lookup() -> ToolRegistry {
    let handler: Arc<dyn ToolHandler> = Arc::new(FnTool::new(
        ToolDefinition::new("lookup", "Look a key up.", json!({"type": "object"})),
        |_input: Value| async { Ok::<_, ToolError>("a".repeat(900)) },
    ));
    ToolRegistry::from_handlers([handler]).expect("registry")
}

fn drain(mut receiver: Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn scripted_lookup() -> ScriptedBackend {
    let backend = ScriptedBackend::new();
    backend
        .respond(
            vec![
                ContentBlock::reasoning("Checking the docket for the hearing date.", Some("sig".into())),
                ContentBlock::tool_call("t1", "lookup", json!({"key": "docket"})),
            ],
            Usage::new(10, 5),
        )
        .respond(
            vec![ContentBlock::answer("The hearing is on Monday.")],
            Usage::new(20, 5),
        );
    backend
}

#[tokio::test]
async fn events_carry_profile_prefix_and_reassemble() {
    let backend = scripted_lookup();
    let engine = Engine::new(Arc::new(backend), "m");
    let (sink, receiver) = ChannelSink::channel(1_024);
    let sink: Arc<dyn EventSink> = Arc::new(sink);
    let profile = TaskProfile::new("research", 1_000, 500).with_event_prefix("docket");

    let outcome = engine
        .run(
            Task::new("", "When is the hearing?"),
            &lookup(),
            RunOptions::new(profile).with_sink(sink),
        )
        .await;
    let events = drain(receiver);

    assert!(outcome.success);
    assert!(events.iter().all(|event| event.name.starts_with("docket_")));

    let thinking: String = events
        .iter()
        .filter(|event| event.name == "docket_thinking_delta")
        .filter_map(StreamEvent::text)
        .collect();
    assert_eq!(thinking, outcome.thinking);

    let answer: String = events
        .iter()
        .filter(|event| event.name == "docket_response_delta")
        .filter_map(StreamEvent::text)
        .collect();
    assert_eq!(answer, "The hearing is on Monday.");

    let call = events
        .iter()
        .find(|event| event.name == "docket_tool_call")
        .expect("tool_call event");
    assert_eq!(call.payload["input"], json!({"key": "docket"}));

    let result = events
        .iter()
        .find(|event| event.name == "docket_tool_result")
        .expect("tool_result event");
    assert_eq!(result.payload["result_length"], 900);
    assert_eq!(result.payload["truncated"], false);
    assert_eq!(result.payload["preview"].as_str().map(str::len), Some(500));

    let last = events.last().expect("events");
    assert_eq!(last.name, "docket_complete");
    assert_eq!(last.payload["success"], true);
    assert_eq!(last.payload["usage"]["input_tokens"], 30);
}

#[tokio::test]
async fn turn_complete_reports_running_totals() {
    let engine = Engine::new(Arc::new(scripted_lookup()), "m");
    let (sink, receiver) = ChannelSink::channel(1_024);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    engine
        .run(
            Task::new("", "go"),
            &lookup(),
            RunOptions::new(TaskProfile::new("research", 1_000, 500)).with_sink(sink),
        )
        .await;
    let turns: Vec<(u64, u64)> = drain(receiver)
        .iter()
        .filter(|event| event.name == "research_turn_complete")
        .map(|event| {
            (
                event.payload["turn"].as_u64().unwrap_or_default(),
                event.payload["usage"]["input_tokens"].as_u64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(turns, vec![(1, 10), (2, 30)]);
}

#[tokio::test]
async fn failure_emits_error_and_no_complete() {
    let backend = ScriptedBackend::new();
    backend.refuse("overloaded");
    let engine = Engine::new(Arc::new(backend), "m");
    let (sink, receiver) = ChannelSink::channel(64);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let outcome = engine
        .run(
            Task::new("", "go"),
            &ToolRegistry::new(),
            RunOptions::new(TaskProfile::new("brief", 1_000, 500)).with_sink(sink),
        )
        .await;
    let events = drain(receiver);

    assert!(!outcome.success);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "brief_error");
    assert!(events[0].payload["error"].as_str().is_some_and(|e| e.contains("overloaded")));
}

#[tokio::test]
async fn dropped_receiver_does_not_fail_the_run() {
    let engine = Engine::new(Arc::new(scripted_lookup()), "m");
    let (sink, receiver) = ChannelSink::channel(4);
    drop(receiver);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let outcome = engine
        .run(
            Task::new("", "go"),
            &lookup(),
            RunOptions::new(TaskProfile::new("research", 1_000, 500)).with_sink(sink),
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.answer, "The hearing is on Monday.");
}

#[tokio::test]
async fn slow_consumer_receives_every_event() {
    let engine = Engine::new(Arc::new(scripted_lookup()), "m");
    let (sink, mut receiver) = ChannelSink::channel(2);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let consumer = tokio::spawn(async move {
        let mut names = Vec::new();
        while let Some(event) = receiver.recv().await {
            tokio::task::yield_now().await;
            names.push(event.name);
        }
        names
    });
    let outcome = engine
        .run(
            Task::new("", "go"),
            &lookup(),
            RunOptions::new(TaskProfile::new("research", 1_000, 500)).with_sink(sink),
        )
        .await;
    let names = consumer.await.expect("consumer");

    assert!(outcome.success);
    assert_eq!(names.first().map(String::as_str), Some("research_thinking_started"));
    assert_eq!(names.last().map(String::as_str), Some("research_complete"));
}
