//! Multi-phase pipelines, deadlines, and follow-up chat over shared sessions.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use thinkloop_core::application::{
    ChatService, EventSink, FnSink, Phase, Pipeline, RunOptions, Task, TaskProfile, ToolRegistry,
    spawn_with_deadline,
};
use thinkloop_core::domain::{ContentBlock, StreamEvent, Usage, UsageAccumulator};
use thinkloop_core::infrastructure::model::ScriptedBackend;
use thinkloop_core::Engine;
use thinkloop_session::{ChatRole, SessionStore};

fn summarize_then_review() -> Pipeline {
    Pipeline::new("review")
        .phase(Phase::new(
            "summary",
            TaskProfile::preset("cascade_summary").expect("preset"),
            |_| Task::new("Summarise the record.", "RECORD"),
        ))
        .phase(Phase::new(
            "critique",
            TaskProfile::preset("judge").expect("preset"),
            |done| {
                let summary = done
                    .iter()
                    .find(|phase| phase.name == "summary")
                    .map(|phase| phase.outcome.answer.clone())
                    .unwrap_or_default();
                Task::new("Critique the summary.", summary)
            },
        ))
}

#[tokio::test]
async fn later_phase_reads_earlier_answer_and_usage_accumulates() {
    let backend = ScriptedBackend::new();
    backend
        .respond(vec![ContentBlock::answer("short summary")], Usage::new(1_000, 100))
        .respond(
            vec![ContentBlock::answer("{\"issues\": []}")],
            Usage::new(500, 50),
        );
    let engine = Engine::new(Arc::new(backend.clone()), "m");
    let accumulator = UsageAccumulator::new();

    let outcome = summarize_then_review()
        .run(&engine, &ToolRegistry::new(), None, &accumulator)
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.usage.total_input, 1_500);
    assert_eq!(outcome.usage.call_count, 2);
    assert_eq!(backend.requests()[1].turns[0].answer_text(), "short summary");
    assert_eq!(backend.requests()[1].system, "Critique the summary.");
    assert_eq!(backend.requests()[0].reasoning_budget_tokens, 30_000);
    assert_eq!(
        outcome.phase("critique").and_then(|run| run.parsed.clone()),
        Some(serde_json::json!({"issues": []}))
    );
}

#[tokio::test]
async fn phase_events_use_phase_names() {
    let backend = ScriptedBackend::new();
    backend
        .respond(vec![ContentBlock::answer("s")], Usage::default())
        .respond(vec![ContentBlock::answer("c")], Usage::default());
    let engine = Engine::new(Arc::new(backend), "m");
    let names = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = Arc::clone(&names);
    let sink: Arc<dyn EventSink> = Arc::new(FnSink::new(move |event: StreamEvent| {
        recorder.lock().expect("lock").push(event.name);
    }));

    summarize_then_review()
        .run(&engine, &ToolRegistry::new(), Some(sink), &UsageAccumulator::new())
        .await;

    let names = names.lock().expect("lock");
    assert_eq!(names[0], "review_phase_started");
    assert!(names.contains(&"summary_complete".to_string()));
    assert!(names.contains(&"critique_response_delta".to_string()));
    assert_eq!(
        names.iter().filter(|name| *name == "review_phase_started").count(),
        2
    );
}

#[tokio::test]
async fn deadline_wraps_a_pipeline_phase_profile() {
    let backend = ScriptedBackend::new();
    backend.respond(vec![ContentBlock::answer("in time")], Usage::new(3, 1));
    let engine = Engine::new(Arc::new(backend), "m");
    let accumulator = UsageAccumulator::new();

    let outcome = spawn_with_deadline(
        engine,
        Task::new("", "quick"),
        ToolRegistry::new(),
        RunOptions::new(TaskProfile::preset("hearing_prep").expect("preset"))
            .with_accumulator(accumulator.clone()),
        Duration::from_secs(30),
    )
    .await;

    assert!(outcome.success);
    assert_eq!(accumulator.snapshot().total_input, 3);
}

#[tokio::test]
async fn chat_sessions_are_independent() {
    let backend = ScriptedBackend::new();
    backend
        .respond(vec![ContentBlock::answer("alpha-1")], Usage::default())
        .respond(vec![ContentBlock::answer("beta-1")], Usage::default())
        .respond(vec![ContentBlock::answer("alpha-2")], Usage::default());
    let sessions = SessionStore::new(20);
    let chat = ChatService::new(
        Engine::new(Arc::new(backend.clone()), "m"),
        sessions.clone(),
        TaskProfile::preset("chat").expect("preset"),
        "Answer follow-up questions.",
    );
    let tools = ToolRegistry::new();

    chat.send("alpha", "CTX-A", "first?", &tools, None).await;
    chat.send("beta", "CTX-B", "first?", &tools, None).await;
    let reply = chat.send("alpha", "CTX-A", "second?", &tools, None).await;

    assert_eq!(reply.answer, "alpha-2");
    let alpha = sessions.history("alpha");
    assert_eq!(alpha.len(), 4);
    assert_eq!(alpha[0].content, "CTX-A\n\n---\n\nfirst?");
    assert_eq!(alpha[3].role, ChatRole::Assistant);
    assert_eq!(sessions.history("beta").len(), 2);

    let third_request = &backend.requests()[2];
    assert_eq!(third_request.turns.len(), 3);
    assert_eq!(third_request.turns[1].answer_text(), "alpha-1");
}

#[tokio::test]
async fn chat_history_is_bounded() {
    let backend = ScriptedBackend::new();
    for i in 0..4 {
        backend.respond(vec![ContentBlock::answer(format!("a{i}"))], Usage::default());
    }
    let chat = ChatService::new(
        Engine::new(Arc::new(backend.clone()), "m"),
        SessionStore::new(4),
        TaskProfile::preset("chat").expect("preset"),
        "",
    );
    let tools = ToolRegistry::new();
    for i in 0..4 {
        chat.send("s", "", &format!("q{i}"), &tools, None).await;
    }

    let history = chat.sessions().history("s");
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content, "q2");
    assert_eq!(backend.requests()[3].turns.len(), 5);
}
