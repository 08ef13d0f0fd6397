//! Tool registry and dispatcher behaviour through the public API.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thinkloop_core::application::tooling::cap_result;
use thinkloop_core::application::{ToolDispatcher, ToolError, ToolHandler, ToolRegistry};
use thinkloop_core::domain::ToolDefinition;

struct CountingTool {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolHandler for CountingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "count",
            "Count invocations.",
            json!({"type": "object", "properties": {}}),
        )
    }

    async fn call(&self, input: Value) -> Result<String, ToolError> {
        if input.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(ToolError::execution("count", "asked to fail"));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(n.to_string())
    }
}

struct SlowTool;

#[async_trait]
impl ToolHandler for SlowTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("slow", "Yield before answering.", json!({"type": "object"}))
    }

    async fn call(&self, _input: Value) -> Result<String, ToolError> {
        tokio::task::yield_now().await;
        Ok("slow done".into())
    }
}

fn registry(calls: &Arc<AtomicUsize>) -> ToolRegistry {
    let counting: Arc<dyn ToolHandler> = Arc::new(CountingTool {
        calls: Arc::clone(calls),
    });
    let slow: Arc<dyn ToolHandler> = Arc::new(SlowTool);
    ToolRegistry::from_handlers([counting, slow]).expect("registry")
}

#[tokio::test]
async fn log_records_every_call_in_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = ToolDispatcher::new(registry(&calls));

    dispatcher.execute("count", json!({})).await;
    dispatcher.execute("slow", json!({"x": 1})).await;
    dispatcher.execute("count", json!({"fail": true})).await;
    dispatcher.execute("missing", json!({})).await;

    let log = dispatcher.into_log();
    let names: Vec<&str> = log.iter().map(|record| record.name.as_str()).collect();
    assert_eq!(names, ["count", "slow", "count", "missing"]);
    assert_eq!(log[1].input, json!({"x": 1}));
    assert_eq!(log[1].result_length, "slow done".len());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_become_error_payloads() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = ToolDispatcher::new(registry(&calls));

    let failed = dispatcher.execute("count", json!({"fail": true})).await;
    let parsed: Value = serde_json::from_str(&failed.content).expect("json payload");
    assert_eq!(parsed["error"], "count execution error: asked to fail");

    let unknown = dispatcher.execute("nope", json!({})).await;
    let parsed: Value = serde_json::from_str(&unknown.content).expect("json payload");
    assert_eq!(parsed["error"], "Unknown tool: nope");
    assert!(!unknown.truncated);
}

#[tokio::test]
async fn cap_is_configurable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = ToolDispatcher::new(registry(&calls)).with_cap(4);

    let result = dispatcher.execute("slow", json!({})).await;
    assert!(result.truncated);
    assert_eq!(result.original_length, 9);
    assert_eq!(
        result.content,
        "slow\n\n[Truncated: result was 9 characters]"
    );
    assert_eq!(dispatcher.log()[0].result_length, result.content.chars().count());
}

#[test]
fn cap_counts_characters_not_bytes() {
    let content = "é".repeat(10);
    let untouched = cap_result(content.clone(), 10);
    assert!(!untouched.truncated);
    assert_eq!(untouched.content, content);

    let capped = cap_result(content, 3);
    assert!(capped.content.starts_with("ééé\n\n"));
    assert_eq!(capped.original_length, 10);
    assert_eq!(capped.preview(2), "éé");
}

#[test]
fn registry_keeps_declaration_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let tools = registry(&calls);
    let names: Vec<String> = tools.definitions().into_iter().map(|d| d.name).collect();
    assert_eq!(names, ["count", "slow"]);

    let only_slow = tools.subset(&["slow", "ghost"]);
    assert_eq!(only_slow.len(), 1);
    assert!(only_slow.get("count").is_none());
}

#[test]
fn duplicate_names_are_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut tools = registry(&calls);
    let err = tools
        .register(Arc::new(SlowTool))
        .expect_err("duplicate");
    assert_eq!(err, ToolError::DuplicateTool("slow".into()));
}
