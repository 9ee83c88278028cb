//! Configuration file loading behavior against real files.

use std::io::Write;
use std::time::Duration;
use vajrapulse::{ConfigError, ThreadPoolStrategy, VajraPulseConfig};

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn yaml_file_loads_with_defaults_for_omitted_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "vajrapulse.conf.yml",
        r#"
execution:
  drainTimeout: 1s
  forceTimeout: 4s
observability:
  structuredLogging: false
"#,
    );

    let config = VajraPulseConfig::load_from(&path).unwrap();
    assert_eq!(config.execution.drain_timeout, Duration::from_secs(1));
    assert_eq!(config.execution.force_timeout, Duration::from_secs(4));
    assert!(!config.observability.structured_logging);
    // Untouched keys fall back to defaults.
    assert_eq!(config.execution.default_thread_pool, ThreadPoolStrategy::Virtual);
    assert_eq!(config.observability.otlp_endpoint, "http://localhost:4318");
}

#[test]
fn json_file_is_accepted_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "vajrapulse.conf.json",
        r#"{
  "execution": {
    "drainTimeout": "500ms",
    "forceTimeout": "2s",
    "defaultThreadPool": "PLATFORM",
    "platformThreadPoolSize": 8
  }
}"#,
    );

    let config = VajraPulseConfig::load_from(&path).unwrap();
    assert_eq!(config.execution.drain_timeout, Duration::from_millis(500));
    assert_eq!(config.execution.default_thread_pool, ThreadPoolStrategy::Platform);
    assert_eq!(config.execution.platform_thread_pool_size, 8);
}

#[test]
fn invalid_values_produce_one_aggregated_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "bad.yml",
        r#"
execution:
  drainTimeout: 10s
  forceTimeout: 2s
  platformThreadPoolSize: -7
observability:
  tracingSampleRate: 3.0
"#,
    );

    let err = VajraPulseConfig::load_from(&path).expect_err("config is invalid");
    match err {
        ConfigError::Validation { issues } => {
            assert_eq!(issues.len(), 3, "all offenders listed at once: {issues:?}");
            assert!(issues.iter().any(|i| i.contains("forceTimeout")));
            assert!(issues.iter().any(|i| i.contains("platformThreadPoolSize")));
            assert!(issues.iter().any(|i| i.contains("tracingSampleRate")));
        }
        other => panic!("expected aggregated validation error, got {other:?}"),
    }
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "broken.yml", "execution: [not, a, mapping]");
    let err = VajraPulseConfig::load_from(&path).expect_err("broken file");
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn save_load_save_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = VajraPulseConfig::default();
    config.execution.drain_timeout = Duration::from_millis(2_500);
    config.observability.tracing_enabled = true;

    let first = dir.path().join("first.yml");
    let second = dir.path().join("second.yml");
    config.save(&first).unwrap();
    let reloaded = VajraPulseConfig::load_from(&first).unwrap();
    assert_eq!(config, reloaded);

    reloaded.save(&second).unwrap();
    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        std::fs::read_to_string(&second).unwrap(),
        "serialization is canonical"
    );
}
