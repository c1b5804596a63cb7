use std::fs;
use std::time::Duration;

use todo_sync::config::{Config, CONFIG_FILE};
use todo_sync::engine::EngineConfig;

#[test]
fn config_defaults_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::load_or_default(&dir.path().join(CONFIG_FILE));

    assert_eq!(config.remote.base_url, "https://dummyjson.com/todos");
    assert_eq!(config.remote.limit, 30);
    assert_eq!(config.tasks.default_owner_tag, 1);
    assert_eq!(config.query.stale_after_secs, 300);
}

#[test]
fn config_partial_sections_keep_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(CONFIG_FILE);
    fs::write(&path, "[tasks]\ndefault_owner_tag = 42\n")?;

    let config = Config::load(&path)?;
    assert_eq!(config.tasks.default_owner_tag, 42);
    assert_eq!(config.remote.timeout_ms, 10_000);
    assert_eq!(config.storage.op_timeout_ms, 5_000);
    Ok(())
}

#[test]
fn invalid_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE);
    fs::write(&path, "[storage]\nop_timeout_ms = 0\n").expect("write config");

    assert!(Config::load(&path).is_err());
    let config = Config::load_or_default(&path);
    assert_eq!(config.storage.op_timeout_ms, 5_000);
}

#[test]
fn engine_config_from_file_config() {
    let mut config = Config::default();
    config.remote.timeout_ms = 1500;
    config.storage.op_timeout_ms = 250;
    config.tasks.default_owner_tag = 9;

    let engine = EngineConfig::from(&config);
    assert_eq!(engine.fetch_timeout, Duration::from_millis(1500));
    assert_eq!(engine.op_timeout, Duration::from_millis(250));
    assert_eq!(engine.default_owner_tag, 9);
}

#[test]
fn config_save_then_load() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(CONFIG_FILE);
    let mut config = Config::default();
    config.remote.limit = 12;
    config.save(&path)?;

    assert_eq!(Config::load(&path)?.remote.limit, 12);
    Ok(())
}
