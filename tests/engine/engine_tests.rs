//! End-to-end engine runs against a scripted backend.

use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use thinkloop_core::application::{
    FnTool, RunOptions, Task, TaskProfile, ToolError, ToolHandler, ToolRegistry,
};
use thinkloop_core::config::{AppConfig, EngineSettings};
use thinkloop_core::domain::{ContentBlock, Role, ToolDefinition, Usage, UsageAccumulator};
use thinkloop_core::infrastructure::model::{ScriptedBackend, StopReason};
use thinkloop_core::Engine;

fn echo_tool(name: &str) -> Arc<dyn ToolHandler> {
    let tool = name.to_string();
    Arc::new(FnTool::new(
        ToolDefinition::new(name, "Echo the `text` field.", json!({"type": "object"})),
        move |input: Value| {
            let tool = tool.clone();
            async move {
                input
                    .get("text")
                    .and_then(Value::as_str)
                    .map(|text| format!("{tool}:{text}"))
                    .ok_or_else(|| ToolError::invalid_input(tool, "missing text"))
            }
        },
    ))
}

fn blob_tool(size: usize) -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolDefinition::new("dump", "Return a large blob.", json!({"type": "object"})),
        move |_input: Value| async move { Ok::<_, ToolError>("x".repeat(size)) },
    ))
}

fn profile() -> TaskProfile {
    TaskProfile::new("analysis", 2_000, 1_000)
}

#[tokio::test]
async fn several_calls_in_one_turn_run_in_order() {
    let backend = ScriptedBackend::new();
    backend
        .respond(
            vec![
                ContentBlock::reasoning("Need both.", Some("sig".into())),
                ContentBlock::tool_call("a", "left", json!({"text": "one"})),
                ContentBlock::tool_call("b", "right", json!({"text": "two"})),
            ],
            Usage::new(50, 10),
        )
        .respond(vec![ContentBlock::answer("one and two")], Usage::new(80, 5));
    let tools = ToolRegistry::from_handlers([echo_tool("left"), echo_tool("right")]).expect("tools");
    let engine = Engine::new(Arc::new(backend.clone()), "m");

    let outcome = engine
        .run(Task::new("sys", "go"), &tools, RunOptions::new(profile()))
        .await;

    assert!(outcome.success);
    let names: Vec<&str> = outcome.tool_log.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["left", "right"]);

    let second = &backend.requests()[1];
    let results = &second.turns[2];
    assert_eq!(results.role, Role::Tool);
    assert_eq!(results.blocks.len(), 2);
    match (&results.blocks[0], &results.blocks[1]) {
        (
            ContentBlock::ToolResult { tool_call_id: first, content: first_content, .. },
            ContentBlock::ToolResult { tool_call_id: second, content: second_content, .. },
        ) => {
            assert_eq!(first, "a");
            assert_eq!(first_content, "left:one");
            assert_eq!(second, "b");
            assert_eq!(second_content, "right:two");
        }
        other => panic!("unexpected blocks {other:?}"),
    }
}

#[tokio::test]
async fn fenced_json_answer_is_parsed() {
    let backend = ScriptedBackend::new();
    backend.respond(
        vec![ContentBlock::answer(
            "Here is the ruling:\n```json\n{\"verdict\": \"dismissed\", \"score\": 7}\n```",
        )],
        Usage::default(),
    );
    let engine = Engine::new(Arc::new(backend), "m");

    let outcome = engine
        .run(Task::new("", "rule"), &ToolRegistry::new(), RunOptions::new(profile()))
        .await;

    assert_eq!(outcome.parsed, Some(json!({"verdict": "dismissed", "score": 7})));
    assert!(outcome.answer.starts_with("Here is the ruling"));
}

#[tokio::test]
async fn oversized_tool_output_is_capped_in_history() {
    let backend = ScriptedBackend::new();
    backend
        .respond(
            vec![ContentBlock::tool_call("d1", "dump", json!({}))],
            Usage::default(),
        )
        .respond(vec![ContentBlock::answer("ok")], Usage::default());
    let settings = EngineSettings {
        tool_result_cap: 100,
        ..EngineSettings::default()
    };
    let engine = Engine::new(Arc::new(backend.clone()), "m").with_settings(settings);
    let tools = ToolRegistry::from_handlers([blob_tool(1_000)]).expect("tools");

    let outcome = engine
        .run(Task::new("", "dump it"), &tools, RunOptions::new(profile()))
        .await;

    let fed_back = match &backend.requests()[1].turns[2].blocks[0] {
        ContentBlock::ToolResult { content, truncated, .. } => {
            assert!(*truncated);
            content.clone()
        }
        other => panic!("unexpected block {other:?}"),
    };
    assert!(fed_back.starts_with(&"x".repeat(100)));
    assert!(fed_back.ends_with("[Truncated: result was 1000 characters]"));
    assert_eq!(outcome.tool_log[0].result_length, fed_back.chars().count());
}

#[tokio::test]
async fn settings_turn_limit_applies_without_profile_override() {
    let backend = ScriptedBackend::new();
    for i in 0..2 {
        backend.respond(
            vec![ContentBlock::tool_call(format!("c{i}"), "left", json!({"text": "again"}))],
            Usage::default(),
        );
    }
    let settings = EngineSettings {
        max_turns: 2,
        ..EngineSettings::default()
    };
    let engine = Engine::new(Arc::new(backend.clone()), "m").with_settings(settings);
    let tools = ToolRegistry::from_handlers([echo_tool("left")]).expect("tools");

    let outcome = engine
        .run(Task::new("sys", "loop"), &tools, RunOptions::new(profile()))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.tool_log.len(), 1);
    assert_eq!(backend.remaining(), 0);
}

#[tokio::test]
async fn natural_end_with_stray_tool_call_stops() {
    let backend = ScriptedBackend::new();
    backend.respond_with(
        vec![
            ContentBlock::answer("Done."),
            ContentBlock::tool_call("late", "left", json!({"text": "x"})),
        ],
        Usage::default(),
        StopReason::NaturalEnd,
    );
    let engine = Engine::new(Arc::new(backend.clone()), "m");
    let tools = ToolRegistry::from_handlers([echo_tool("left")]).expect("tools");

    let outcome = engine
        .run(Task::new("", "go"), &tools, RunOptions::new(profile()))
        .await;

    assert!(outcome.success);
    assert_eq!(backend.call_count(), 1);
    assert!(outcome.tool_log.is_empty());
}

#[tokio::test]
async fn max_tokens_turn_keeps_complete_calls_but_runs_none() {
    let backend = ScriptedBackend::new();
    backend.respond_with(
        vec![
            ContentBlock::tool_call("whole", "left", json!({"text": "a"})),
            ContentBlock::tool_call("cut", "left", json!("{\"text\": \"b")),
        ],
        Usage::new(10, 4_096),
        StopReason::BudgetExhausted,
    );
    let engine = Engine::new(Arc::new(backend.clone()), "m");
    let tools = ToolRegistry::from_handlers([echo_tool("left")]).expect("tools");

    let outcome = engine
        .run(Task::new("", "go"), &tools, RunOptions::new(profile()))
        .await;

    assert!(outcome.success);
    assert_eq!(backend.call_count(), 1);
    assert!(outcome.tool_log.is_empty());
    let recorded = &outcome.conversation.turns()[1];
    let ids: Vec<&str> = recorded.tool_calls().map(|(id, _, _)| id).collect();
    assert_eq!(ids, ["whole"]);
}

#[tokio::test]
async fn concurrent_runs_share_an_accumulator() {
    let first = ScriptedBackend::new();
    first.respond(vec![ContentBlock::answer("a")], Usage::new(100, 10));
    let second = ScriptedBackend::new();
    second.respond(
        vec![
            ContentBlock::reasoning("x".repeat(400), Some("s".into())),
            ContentBlock::answer("b"),
        ],
        Usage::new(200, 20),
    );

    let accumulator = UsageAccumulator::new();
    let updates = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&updates);
    let left = Engine::new(Arc::new(first), "m");
    let right = Engine::new(Arc::new(second), "m");
    let tools = ToolRegistry::new();

    let (a, b) = tokio::join!(
        left.run(
            Task::new("", "one"),
            &tools,
            RunOptions::new(profile()).with_accumulator(accumulator.clone()),
        ),
        right.run(
            Task::new("", "two"),
            &tools,
            RunOptions::new(profile())
                .with_accumulator(accumulator.clone())
                .on_usage(move |usage| seen.lock().expect("lock").push(usage)),
        ),
    );

    assert!(a.success && b.success);
    let totals = accumulator.snapshot();
    assert_eq!(totals.call_count, 2);
    assert_eq!(totals.total_input, 300);
    assert_eq!(totals.total_output, 30);
    assert_eq!(totals.estimated_thinking, 100);
    assert_eq!(*updates.lock().expect("lock"), vec![Usage::new(200, 20)]);
}

#[tokio::test]
async fn failed_run_still_counts_usage() {
    let backend = ScriptedBackend::new();
    backend
        .respond(
            vec![ContentBlock::tool_call("c1", "left", json!({"text": "t"}))],
            Usage::new(40, 4),
        )
        .refuse("overloaded");
    let engine = Engine::new(Arc::new(backend), "m");
    let tools = ToolRegistry::from_handlers([echo_tool("left")]).expect("tools");
    let accumulator = UsageAccumulator::new();

    let outcome = engine
        .run(
            Task::new("", "go"),
            &tools,
            RunOptions::new(profile()).with_accumulator(accumulator.clone()),
        )
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.is_some());
    assert_eq!(outcome.usage, Usage::new(40, 4));
    assert_eq!(accumulator.snapshot().call_count, 1);
    assert_eq!(accumulator.snapshot().total_input, 40);
}

#[tokio::test]
async fn engine_built_from_config_uses_its_budget() {
    let config = AppConfig::from_toml(
        "[backend]\nmodel = \"configured-model\"\napi_key = \"k\"\n\
         [budget]\ncontext_limit = 5000\nouter_margin = 1000\ninner_margin = 2000\n",
    )
    .expect("config");
    let backend = ScriptedBackend::new();
    backend.respond(vec![ContentBlock::answer("fine")], Usage::default());
    let engine = Engine::from_config(Arc::new(backend.clone()), &config);

    assert_eq!(engine.model(), "configured-model");
    assert_eq!(engine.budget().limit, 5_000);

    let outcome = engine
        .run(Task::new("", "q"), &ToolRegistry::new(), RunOptions::new(profile()))
        .await;
    assert!(outcome.success);
    assert_eq!(backend.requests()[0].model, "configured-model");
    assert_eq!(backend.requests()[0].max_output_tokens, 3_000);
    assert_eq!(backend.requests()[0].reasoning_budget_tokens, 2_000);
}
