//! Integration tests for the perf-analytics binary and configuration.
//!
//! These tests verify:
//! - The process exit contract (skip, success, failure, usage error)
//! - Configuration loading from the environment

use std::path::Path;
use std::process::{Command, Output};

use perf_analytics::config::{Config, LogFormat};
use perf_analytics::error::ConfigError;
use serial_test::serial;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

const ENV_VARS: [&str; 9] = [
    "PERF_DATA_DIR",
    "PERF_BASELINE_DIR",
    "ANOMALY_STD_MULTIPLIER",
    "ADAPTIVE_MIN_SAMPLES",
    "ROLLING_HISTORY_MAX",
    "CAPACITY_SCALE_RPS",
    "CAPACITY_APPROACHING_RPS",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

/// Run the binary with `PERF_DATA_DIR` pointing at `data_dir`.
fn run_cli(data_dir: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_perf-analytics"));
    cmd.args(args);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("PERF_DATA_DIR", data_dir).env("LOG_LEVEL", "info");
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to run binary")
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
    std::fs::write(path, contents).expect("write");
}

// ============================================================================
// Exit Contract Tests
// ============================================================================

#[test]
fn test_missing_input_exits_zero_with_diagnostic() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_cli(dir.path(), &["anomaly-score"], &[]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("residuals.json not found"), "{stderr}");
}

#[test]
fn test_success_prints_written_artifact() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write(
        &dir.path().join("residuals.json"),
        r#"[{"metric":"a","residual":1},{"metric":"b","residual":3},{"metric":"c","residual":5}]"#,
    );

    let output = run_cli(dir.path(), &["anomaly-score"], &[]);

    assert_eq!(output.status.code(), Some(0));
    let written = std::fs::read(dir.path().join("anomaly_report.json")).expect("written");
    assert_eq!(output.stdout, written);
}

#[test]
fn test_malformed_input_exits_non_zero() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write(&dir.path().join("residuals.json"), "[{");

    let output = run_cli(dir.path(), &["history-update"], &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(!dir.path().join("metric_history.json").exists());
}

#[test]
fn test_no_stable_capacity_exits_non_zero() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write(
        &dir.path().join("step-load-1.json"),
        r#"[{"connections":10,"rps":5,"errors":1,"timeouts":0}]"#,
    );

    let output = run_cli(dir.path(), &["capacity-estimate"], &[]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No stable capacity"), "{stderr}");
}

#[test]
fn test_unknown_command_is_usage_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_cli(dir.path(), &["frobnicate"], &[]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: perf-analytics"));
}

#[test]
fn test_invalid_config_exits_non_zero() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_cli(dir.path(), &["run"], &[("ANOMALY_STD_MULTIPLIER", "wide")]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ANOMALY_STD_MULTIPLIER"));
}

#[test]
fn test_json_logs_go_to_stderr() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_cli(dir.path(), &["threshold-update"], &[("LOG_FORMAT", "json")]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first = stderr.lines().next().expect("a log line");
    let event: serde_json::Value = serde_json::from_str(first).expect("JSON log line");
    assert_eq!(event["level"], "WARN");
}

#[test]
fn test_schema_command() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_cli(dir.path(), &["schema", "anomaly-report"], &[]);

    assert_eq!(output.status.code(), Some(0));
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON schema");
    assert_eq!(schema["title"], "AnomalyReport");
}

// ============================================================================
// Configuration Tests
// ============================================================================

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_from_env_overrides() {
    clear_env();
    std::env::set_var("PERF_DATA_DIR", "/var/lib/perf");
    std::env::set_var("ANOMALY_STD_MULTIPLIER", "2.5");
    std::env::set_var("ROLLING_HISTORY_MAX", "50");
    std::env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().expect("Config should load");
    clear_env();

    assert_eq!(config.data_dir, Path::new("/var/lib/perf"));
    assert_eq!(config.baseline_dir, Path::new("/var/lib/perf/baselines"));
    assert!((config.std_multiplier - 2.5).abs() < f64::EPSILON);
    assert_eq!(config.max_samples, 50);
    assert_eq!(config.min_samples, 20);
    assert_eq!(config.log_format, LogFormat::Json);
}

#[test]
#[serial]
fn test_config_rejects_inverted_cutoffs() {
    clear_env();
    std::env::set_var("CAPACITY_SCALE_RPS", "200");

    let result = Config::from_env();
    clear_env();

    assert!(matches!(result, Err(ConfigError::InvalidValue { var, .. }) if var == "CAPACITY_SCALE_RPS"));
}
