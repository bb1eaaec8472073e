//! Step-load results through capacity estimation.

use perf_analytics::config::Config;
use perf_analytics::error::{AppError, StageError};
use perf_analytics::gauge::GaugeCache;
use perf_analytics::storage::artifacts::CAPACITY_ESTIMATE;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use super::{read_json, test_pipeline, write_file};

#[tokio::test]
async fn test_latest_step_load_file_wins() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 0, Config::default());
    let data = pipeline.config().data_dir.clone();
    write_file(
        &data.join("step-load-2024-03-01T10-00-00.json"),
        r#"[{"connections": 10, "rps": 900.0, "p95": 5.0, "errors": 0, "timeouts": 0}]"#,
    );
    write_file(
        &data.join("step-load-2024-03-02T10-00-00.json"),
        r#"[
            {"connections": 10, "rps": 40.0, "p95": 12.0, "errors": 0, "timeouts": 0},
            {"connections": 20, "rps": 90.0, "p95": 25.0, "errors": 0, "timeouts": 0},
            {"connections": 30, "rps": 95.0, "p95": 80.0, "errors": 2, "timeouts": 0}
        ]"#,
    );
    // Not a step-load file.
    write_file(&data.join("step-load-2099.csv"), "connections,rps\n");

    let outcome = pipeline.estimate_capacity().await.expect("estimated");

    let expected = json!({
        "maxStableRps": 90.0,
        "optimalConnections": 20,
        "suggestionCode": 1,
        "suggestion": "approaching",
        "stableSteps": 2,
        "totalSteps": 3
    });
    assert_eq!(read_json(&data.join(CAPACITY_ESTIMATE)), expected);
    let printed: serde_json::Value =
        serde_json::from_str(outcome.output()).expect("stdout is JSON");
    assert_eq!(printed, expected);
}

#[tokio::test]
async fn test_no_stable_step_fails_without_writing() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 0, Config::default());
    let data = pipeline.config().data_dir.clone();
    write_file(
        &data.join("step-load-1.json"),
        r#"[{"connections": 10, "rps": 40.0, "errors": 3}]"#,
    );

    let err = pipeline.estimate_capacity().await.expect_err("must fail");

    assert!(matches!(
        err,
        AppError::Stage(StageError::NoStableCapacity { steps: 1 })
    ));
    assert_ne!(err.exit_code(), 0);
    assert!(!data.join(CAPACITY_ESTIMATE).exists());
}

#[tokio::test]
async fn test_custom_cutoffs_and_gauges() {
    let dir = TempDir::new().expect("temp dir");
    let config = Config {
        scale_below_rps: 1_000.0,
        approaching_below_rps: 2_000.0,
        ..Config::default()
    };
    let pipeline = test_pipeline(&dir, 0, config);
    let data = pipeline.config().data_dir.clone();
    write_file(
        &data.join("step-load-1.json"),
        r#"[{"connections": 64, "rps": 850.5}]"#,
    );

    pipeline.estimate_capacity().await.expect("estimated");
    let cache = GaugeCache::new();
    let outcome = pipeline.publish(&cache).await.expect("published");

    assert_eq!(
        outcome.output(),
        "perf_capacity_max_stable_rps 850.5\n\
         perf_capacity_optimal_connections 64\n\
         perf_capacity_suggestion_code 2\n"
    );
}
