//! 配置加载集成测试
//!
//! 在临时目录中写入配置文件，验证分层覆盖顺序。

use entity_rules_shared::config::AppConfig;
use std::fs;

#[test]
fn test_layered_files_override_in_order() {
    let dir = tempfile::tempdir().unwrap();

    fs::write(
        dir.path().join("default.toml"),
        r#"
        [observability]
        log_level = "warn"
        json_logs = true

        [engine]
        rules_path = "rules/default.yaml"
        "#,
    )
    .unwrap();

    fs::write(
        dir.path().join("entity-rules.toml"),
        r#"
        [engine]
        rules_path = "rules/service.json"
        trace_enabled = true
        "#,
    )
    .unwrap();

    let config = AppConfig::load_from(dir.path(), "entity-rules").unwrap();

    assert_eq!(config.service_name, "entity-rules");
    assert_eq!(config.observability.log_level, "warn");
    assert!(config.observability.json_logs);
    assert_eq!(config.engine.rules_path, "rules/service.json");
    assert!(config.engine.trace_enabled);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();

    fs::write(
        dir.path().join("default.toml"),
        r#"
        [engine]
        trace_enabled = true
        "#,
    )
    .unwrap();

    let config = AppConfig::load_from(dir.path(), "other-service").unwrap();

    assert!(config.engine.trace_enabled);
    assert_eq!(config.engine.rules_path, "config/rules.yaml");
    assert_eq!(config.observability.log_level, "info");
    assert_eq!(config.observability().service_name, "other-service");
}

#[test]
fn test_invalid_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("default.toml"), "[engine\nrules_path = 1").unwrap();

    assert!(AppConfig::load_from(dir.path(), "entity-rules").is_err());
}
