//! Baseline recording and comparison.

use perf_analytics::config::Config;
use perf_analytics::storage::artifacts::{BASELINE_DELTA, PERF_SUMMARY};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use super::{read_json, test_pipeline, write_file};

fn baseline_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("baseline dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn summary_json(scenario: &str, p50: f64) -> String {
    json!({
        "scenario": scenario,
        "p50": p50,
        "p95": p50 * 2.0,
        "rpsAvg": 100.0,
        "rpsP95": 120.0,
        "duration": 30.0,
        "connections": 10,
    })
    .to_string()
}

#[tokio::test]
async fn test_record_then_compare() {
    let dir = TempDir::new().expect("temp dir");
    let summaries = [
        (1_704_067_200_000, "health.check", 10.0, 100.0),
        (1_704_067_260_000, "login", 50.0, 20.0),
        (1_704_067_320_000, "health.check", 15.0, 0.0),
        (1_704_067_380_000, "health.check", 12.0, 80.0),
    ];

    for (millis, scenario, p50, rps) in summaries {
        let pipeline = test_pipeline(&dir, millis, Config::default());
        write_file(
            &pipeline.config().data_dir.join(PERF_SUMMARY),
            &format!(
                r#"{{"scenario":"{scenario}","p50":{p50},"p95":{p95},"rpsAvg":{rps},"rpsP95":{rps},"duration":30.0,"connections":10}}"#,
                p95 = p50 * 2.0
            ),
        );
        pipeline.record_baseline(None, None).await.expect("recorded");
    }

    let pipeline = test_pipeline(&dir, 0, Config::default());
    assert_eq!(
        baseline_files(&pipeline.config().baseline_dir),
        vec![
            "2024-01-01T00-00-00-000Z-health.check.json",
            "2024-01-01T00-01-00-000Z-login.json",
            "2024-01-01T00-02-00-000Z-health.check.json",
            "2024-01-01T00-03-00-000Z-health.check.json",
        ]
    );

    pipeline.compare_baselines().await.expect("compared");
    let delta = read_json(&pipeline.config().data_dir.join(BASELINE_DELTA));

    assert_eq!(delta["skipped"], json!(["login"]));
    let health = &delta["scenarios"]["health.check"];
    assert_eq!(health["previous"], json!("2024-01-01T00-02-00-000Z-health.check.json"));
    assert_eq!(health["current"], json!("2024-01-01T00-03-00-000Z-health.check.json"));
    assert_eq!(health["p50"], json!({"prev": 15.0, "curr": 12.0, "pct": -20.0}));
    // Previous rps was zero: no percentage.
    assert_eq!(health["rpsAvg"], json!({"prev": 0.0, "curr": 80.0, "pct": null}));
}

#[tokio::test]
async fn test_record_from_source_with_missing_scenario() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 1_704_067_200_123, Config::default());
    let source = dir.path().join("bench-output.json");
    write_file(
        &source,
        r#"{"p50": 3.5, "p95": 7.0, "rpsAvg": 90.0, "rpsP95": 110.0, "duration": 30.0, "connections": 8}"#,
    );

    let outcome = pipeline
        .record_baseline(Some(&source), None)
        .await
        .expect("recorded");
    assert!(!outcome.is_skipped());

    let files = baseline_files(&pipeline.config().baseline_dir);
    assert_eq!(files, vec!["2024-01-01T00-00-00-123Z-unknown.json"]);
    let stored = read_json(&pipeline.config().baseline_dir.join(&files[0]));
    assert_eq!(stored["scenario"], json!("unknown"));
    assert_eq!(stored["connections"], json!(8));
}

#[tokio::test]
async fn test_compare_skips_malformed_baseline() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 0, Config::default());
    let baselines = pipeline.config().baseline_dir.clone();
    write_file(
        &baselines.join("2024-01-01T00-00-00-000Z-a.json"),
        &summary_json("a", 1.0),
    );
    write_file(&baselines.join("2024-01-02T00-00-00-000Z-a.json"), "{truncated");
    write_file(
        &baselines.join("2024-01-03T00-00-00-000Z-a.json"),
        &summary_json("a", 2.0),
    );

    pipeline.compare_baselines().await.expect("compared");

    let delta = read_json(&pipeline.config().data_dir.join(BASELINE_DELTA));
    assert_eq!(delta["scenarios"]["a"]["p50"]["pct"], json!(100.0));
}

#[tokio::test]
async fn test_compare_ignores_stray_json_files() {
    let dir = TempDir::new().expect("temp dir");
    for (millis, p50) in [(1_704_067_200_000, 10.0), (1_704_067_260_000, 15.0)] {
        let pipeline = test_pipeline(&dir, millis, Config::default());
        write_file(
            &pipeline.config().data_dir.join(PERF_SUMMARY),
            &summary_json("health.check", p50),
        );
        pipeline.record_baseline(None, None).await.expect("recorded");
    }

    let pipeline = test_pipeline(&dir, 0, Config::default());
    let baselines = pipeline.config().baseline_dir.clone();
    write_file(&baselines.join("index.json"), r#"{"owner":"perf-team"}"#);
    write_file(&baselines.join("readme.json"), r#"{"note":"x"}"#);

    pipeline.compare_baselines().await.expect("compared");

    let delta = read_json(&pipeline.config().data_dir.join(BASELINE_DELTA));
    assert_eq!(delta["skipped"], json!([]));
    assert_eq!(
        delta["scenarios"].as_object().expect("scenarios").len(),
        1,
        "{delta}"
    );
    let health = &delta["scenarios"]["health.check"];
    assert_eq!(health["current"], json!("2024-01-01T00-01-00-000Z-health.check.json"));
    assert_eq!(health["p50"]["pct"], json!(50.0));
}

#[tokio::test]
async fn test_record_rejects_summary_without_metrics() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 1_704_067_200_000, Config::default());
    write_file(
        &pipeline.config().data_dir.join(PERF_SUMMARY),
        r#"{"scenario":"health.check"}"#,
    );

    let err = pipeline
        .record_baseline(None, None)
        .await
        .expect_err("missing metrics");

    assert_eq!(err.exit_code(), 1);
    let baselines = &pipeline.config().baseline_dir;
    assert!(!baselines.exists() || baseline_files(baselines).is_empty());
}
