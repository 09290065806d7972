use crate::Config;
use serial_test::serial;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("kiwi.toml");
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_defaults() {
    let config = Config::default();
    assert!(config.llm.safe_mode);
    assert!(config.ui.streaming);
    assert!(!config.ui.debug);
    assert_eq!(config.agent.max_tool_calls, 10);
    assert_eq!(config.agent.max_tool_calls_single_shot, 5);
    assert_eq!(config.agent.max_retries, 3);
    assert_eq!(config.agent.retry_backoff_ms, 500);
    assert_eq!(config.agent.stream_flush_threshold, 100);
    assert_eq!(config.agent.shell, "bash");
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
[llm]
model = "test-model"
safe_mode = false

[agent]
max_retries = 5
"#,
    );

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.llm.model.as_deref(), Some("test-model"));
    assert_eq!(config.llm.provider, "mock");
    assert!(!config.llm.safe_mode);
    assert_eq!(config.agent.max_retries, 5);
    assert_eq!(config.agent.max_tool_calls, 10);
    assert!(config.ui.streaming);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");
    assert!(Config::load(Some(missing.to_str().unwrap())).is_err());
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[llm\nprovider = ");
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse"));
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        ("KIWI_PROVIDER", "other"),
        ("KIWI_MODEL", "m-1"),
        ("KIWI_SAFE_MODE", "false"),
        ("KIWI_STREAMING", "0"),
        ("KIWI_DEBUG", "yes"),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    config
        .apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.llm.provider, "other");
    assert_eq!(config.llm.model.as_deref(), Some("m-1"));
    assert!(!config.llm.safe_mode);
    assert!(!config.ui.streaming);
    assert!(config.ui.debug);
    assert_eq!(config.max_model_calls(), 5);
}

#[test]
fn test_invalid_env_bool_rejected() {
    let mut config = Config::default();
    let result = config.apply_env_overrides(|key| (key == "KIWI_SAFE_MODE").then(|| "maybe".to_string()));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_process_env_applied_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[ui]\ndebug = false\n");

    std::env::set_var("KIWI_DEBUG", "true");
    let config = Config::load(Some(&path));
    std::env::remove_var("KIWI_DEBUG");

    assert!(config.unwrap().ui.debug);
}

#[test]
fn test_validation_rejects_zero_limits() {
    let mut config = Config::default();
    config.agent.max_tool_calls = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.agent.max_retries = 0;
    assert!(config.validate().is_err());
}
