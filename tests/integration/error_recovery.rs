//! Missing and malformed artifacts.

use perf_analytics::config::Config;
use perf_analytics::error::{AppError, StorageError};
use perf_analytics::gauge::{GaugeCache, SectionStatus};
use perf_analytics::storage::artifacts::{
    ANOMALY_REPORT, CAPACITY_ESTIMATE, HISTORY, PERF_SUMMARY, RESIDUALS, THRESHOLDS,
};
use perf_analytics::traits::ArtifactStore;
use tempfile::TempDir;

use super::{read_json, test_pipeline, write_file};

#[tokio::test]
async fn test_fresh_directory_every_stage_skips() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 0, Config::default());
    let cache = GaugeCache::new();

    let outcomes = [
        pipeline.update_history().await.expect("ok"),
        pipeline.score_anomalies().await.expect("ok"),
        pipeline.update_thresholds().await.expect("ok"),
        pipeline.estimate_capacity().await.expect("ok"),
        pipeline.record_baseline(None, None).await.expect("ok"),
        pipeline.compare_baselines().await.expect("ok"),
        pipeline.publish(&cache).await.expect("ok"),
    ];

    assert!(outcomes.iter().all(|o| o.is_skipped()));
    assert!(!pipeline.config().data_dir.exists());
}

#[tokio::test]
async fn test_corrupt_history_is_reinitialized() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 5, Config::default());
    let data = pipeline.config().data_dir.clone();
    write_file(&data.join(HISTORY), "{\"api\": [{\"timestamp\": ");
    write_file(&data.join(RESIDUALS), r#"[{"metric":"api","residual":1.5}]"#);

    pipeline.update_history().await.expect("recovered");

    let history = read_json(&data.join(HISTORY));
    assert_eq!(history, serde_json::json!({"api": [{"timestamp": 5, "value": 1.5}]}));
}

#[tokio::test]
async fn test_malformed_stage_inputs_fail() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 0, Config::default());
    let data = pipeline.config().data_dir.clone();
    write_file(&data.join(RESIDUALS), r#"{"metric":"not a list"}"#);
    write_file(&data.join("step-load-1.json"), r#"[{"rps": 10.0}]"#);
    write_file(&data.join(PERF_SUMMARY), "\"not an object\"");

    for result in [
        pipeline.update_history().await,
        pipeline.score_anomalies().await,
        pipeline.estimate_capacity().await,
        pipeline.record_baseline(None, None).await,
    ] {
        let err = result.expect_err("malformed input");
        assert!(
            matches!(err, AppError::Storage(StorageError::Malformed { .. })),
            "{err}"
        );
        assert_eq!(err.exit_code(), 1);
    }
    assert!(!data.join(HISTORY).exists());
    assert!(!data.join(ANOMALY_REPORT).exists());
    assert!(!data.join(CAPACITY_ESTIMATE).exists());
}

#[tokio::test]
async fn test_publish_keeps_sections_across_bad_refresh() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 0, Config::default());
    let data = pipeline.config().data_dir.clone();
    write_file(&data.join(RESIDUALS), r#"[{"metric":"a","residual":1},{"metric":"b","residual":2}]"#);
    write_file(&data.join("step-load-1.json"), r#"[{"connections": 4, "rps": 300}]"#);
    pipeline.update_history().await.expect("history");
    pipeline.score_anomalies().await.expect("scored");
    pipeline.update_thresholds().await.expect("thresholds");
    pipeline.estimate_capacity().await.expect("capacity");

    let cache = GaugeCache::new();
    pipeline.publish(&cache).await.expect("published");
    let before = cache.snapshot();

    // Thresholds corrupted, capacity removed.
    write_file(&data.join(THRESHOLDS), "garbage");
    std::fs::remove_file(data.join(CAPACITY_ESTIMATE)).expect("remove");

    let report = cache
        .refresh(pipeline.artifacts())
        .await
        .expect("refreshed");
    assert_eq!(report.thresholds, SectionStatus::Malformed);
    assert_eq!(report.capacity, SectionStatus::Missing);
    assert_eq!(report.anomalies, SectionStatus::Loaded);
    assert_eq!(cache.snapshot(), before);

    assert!(pipeline
        .artifacts()
        .read(CAPACITY_ESTIMATE)
        .await
        .expect("read")
        .is_none());
}
