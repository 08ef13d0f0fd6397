//! Configuration loading from files and the environment.

use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use thinkloop_core::config::{AppConfig, ConfigError, resolve_api_key};

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("thinkloop.toml");
    fs::write(&path, content).expect("failed to write config");
    path
}

fn set_var(key: &str, value: &str) {
    // Tests touching the environment are serialized.
    unsafe { env::set_var(key, value) }
}

fn remove_var(key: &str) {
    unsafe { env::remove_var(key) }
}

#[test]
#[serial]
fn api_key_placeholder_expands_from_environment() {
    set_var("THINKLOOP_TEST_KEY", "sk-from-env");
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        "[backend]\nmodel = \"m\"\napi_key = \"${THINKLOOP_TEST_KEY}\"\n",
    );

    let config = AppConfig::load(Some(&path)).expect("load");
    assert_eq!(config.backend.api_key.as_deref(), Some("sk-from-env"));
    remove_var("THINKLOOP_TEST_KEY");
}

#[test]
#[serial]
fn unset_placeholder_leaves_key_empty() {
    remove_var("THINKLOOP_MISSING_KEY");
    let config = AppConfig::from_toml(
        "[backend]\nmodel = \"m\"\napi_key = \"${THINKLOOP_MISSING_KEY}\"\n",
    )
    .expect("config");
    assert!(config.backend.api_key.is_none());
}

#[test]
#[serial]
fn omitted_key_falls_back_to_conventional_variable() {
    set_var("ANTHROPIC_API_KEY", "sk-default");
    assert_eq!(resolve_api_key(None).as_deref(), Some("sk-default"));
    let config = AppConfig::from_toml("[backend]\nmodel = \"m\"\n").expect("config");
    assert_eq!(config.backend.api_key.as_deref(), Some("sk-default"));

    set_var("ANTHROPIC_API_KEY", "   ");
    assert!(resolve_api_key(None).is_none());
    remove_var("ANTHROPIC_API_KEY");
}

#[test]
#[serial]
fn endpoint_placeholder_expands() {
    set_var("THINKLOOP_TEST_HOST", "gateway.internal");
    let config = AppConfig::from_toml(
        "[backend]\nmodel = \"m\"\napi_key = \"k\"\nendpoint = \"https://${THINKLOOP_TEST_HOST}/llm\"\n",
    )
    .expect("config");
    assert_eq!(config.backend.endpoint, "https://gateway.internal/llm");
    remove_var("THINKLOOP_TEST_HOST");
}

#[test]
fn example_profiles_resolve() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        r#"
[backend]
model = "claude-sonnet-4-5"
api_key = "k"

[engine]
max_turns = 0

[profiles.intake]
thinking_budget = 8000
answer_tokens = 4000
tools = ["search_cases", "read_document"]
"#,
    );

    let config = AppConfig::load(Some(&path)).expect("load");
    assert_eq!(config.engine.max_turns, 1);
    let intake = config.profile("intake").expect("intake");
    assert_eq!(intake.max_output_tokens(), 12_000);
    assert_eq!(intake.tools.as_ref().map(Vec::len), Some(2));
    assert!(config.profile("deep_analysis").is_ok());
}

#[test]
fn unreadable_path_is_reported() {
    let dir = tempdir().expect("tempdir");
    let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).expect_err("missing");
    assert!(matches!(err, ConfigError::NotFound { .. }));
    assert!(err.user_message().contains("nope.toml"));

    let err = AppConfig::load(Some(dir.path())).expect_err("directory");
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn profile_with_zero_turns_is_rejected() {
    let err = AppConfig::from_toml(
        "[backend]\nmodel = \"m\"\n[profiles.stuck]\nthinking_budget = 10\nanswer_tokens = 10\nmax_turns = 0\n",
    )
    .expect_err("zero turns");
    assert!(matches!(err, ConfigError::InvalidProfile { .. }));
}
