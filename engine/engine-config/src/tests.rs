//! Tests for the configuration module.

use super::*;
use std::io::Write;

#[test]
fn test_default_config() {
    let config = CentralConfig::default();
    assert_eq!(config.common.log_level, "info");
    assert_eq!(config.server.transport, "stdio");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8000);
    assert!(config.server.allowed_origins.is_empty());
    assert!(config.search.seed.is_none());
}

#[test]
fn test_executor_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.executor.timeout_ms, 5000);
    assert_eq!(config.executor.timeout().as_millis(), 5000);
    assert_eq!(config.executor.grace_ms, 1000);
    assert_eq!(config.executor.max_source_len, 10000);
    assert_eq!(config.executor.max_nesting, 64);
    assert_eq!(config.executor.soft_branching_limit, 1000);
    assert_eq!(config.executor.worker_stack_mb, 64);
}

#[test]
fn test_search_defaults() {
    let config = CentralConfig::default();
    assert!((config.search.default_exploration_weight - 1.0).abs() < f64::EPSILON);
    assert_eq!(config.search.default_samples_per_action, 1);
    assert_eq!(config.search.default_rank_k, 10);
    assert_eq!(config.search.max_rank_k, 1000);
}

#[test]
fn test_visualization_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.visualization.dot_binary, "dot");
    assert_eq!(config.visualization.default_format, "png");
    assert_eq!(config.visualization.default_max_label_length, 20);
    assert_eq!(config.visualization.render_timeout().as_secs(), 30);
}

#[test]
fn test_arbor_env_overrides() {
    std::env::set_var("ARBOR_SERVER_TRANSPORT", "http");
    std::env::set_var("ARBOR_EXECUTOR_TIMEOUT_MS", "250");
    std::env::set_var("ARBOR_SEARCH_SEED", "42");
    std::env::set_var("ARBOR_SERVER_ALLOWED_ORIGINS", "http://a.test, http://b.test");

    let config = apply_env_overrides(CentralConfig::default());
    assert_eq!(config.server.transport, "http");
    assert_eq!(config.executor.timeout_ms, 250);
    assert_eq!(config.search.seed, Some(42));
    assert_eq!(
        config.server.allowed_origins,
        vec!["http://a.test".to_string(), "http://b.test".to_string()]
    );

    std::env::remove_var("ARBOR_SERVER_TRANSPORT");
    std::env::remove_var("ARBOR_EXECUTOR_TIMEOUT_MS");
    std::env::remove_var("ARBOR_SEARCH_SEED");
    std::env::remove_var("ARBOR_SERVER_ALLOWED_ORIGINS");
}

#[test]
fn test_unparseable_env_override_is_ignored() {
    std::env::set_var("ARBOR_SEARCH_MAX_RANK_K", "lots");
    let config = apply_env_overrides(CentralConfig::default());
    assert_eq!(config.search.max_rank_k, 1000);
    std::env::remove_var("ARBOR_SEARCH_MAX_RANK_K");
}

#[test]
fn test_parse_config_toml() {
    let toml_content = r#"
[server]
transport = "http"
port = 9100

[executor]
timeout_ms = 1500
max_instructions = 1000

[search]
seed = 7
"#;
    let config: CentralConfig = toml::from_str(toml_content).unwrap();
    assert_eq!(config.server.transport, "http");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.executor.timeout_ms, 1500);
    assert_eq!(config.executor.max_instructions, 1000);
    assert_eq!(config.search.seed, Some(7));
}

#[test]
fn test_partial_config() {
    let toml_content = r#"
[visualization]
dot_binary = "/opt/graphviz/bin/dot"
"#;
    let config: CentralConfig = toml::from_str(toml_content).unwrap();
    assert_eq!(config.visualization.dot_binary, "/opt/graphviz/bin/dot");
    assert_eq!(config.visualization.score_precision, 2); // Default
    assert_eq!(config.server.port, 8000); // Default
    assert_eq!(config.executor.max_source_len, 10000); // Default
}

#[test]
fn test_load_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[search]\nmax_rank_k = 50\n").unwrap();

    let config = load_from_path(file.path());
    assert_eq!(config.search.max_rank_k, 50);
    assert_eq!(config.search.default_rank_k, 10);
}

#[test]
fn test_load_from_invalid_file_falls_back_to_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server\nport = ").unwrap();

    let config = load_from_path(file.path());
    assert_eq!(config.server.port, 8000);
}

#[test]
fn test_load_from_missing_file_falls_back_to_defaults() {
    let config = load_from_path(std::path::Path::new("/definitely/not/here.toml"));
    assert_eq!(config.visualization.dot_binary, "dot");
}
