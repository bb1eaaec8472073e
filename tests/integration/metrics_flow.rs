//! Residuals through history, anomaly scoring, thresholds and publish.

use perf_analytics::config::Config;
use perf_analytics::gauge::{GaugeCache, SectionStatus};
use perf_analytics::storage::artifacts::{ANOMALY_REPORT, HISTORY, RESIDUALS, THRESHOLDS};
use perf_analytics::threshold::Breach;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use super::{read_json, test_pipeline, write_file};

fn config() -> Config {
    Config {
        min_samples: 3,
        max_samples: 4,
        std_multiplier: 1.0,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_reference_batch_scores() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 1_000, config());
    let data = pipeline.config().data_dir.clone();
    write_file(
        &data.join(RESIDUALS),
        r#"[{"metric":"a","residual":1},{"metric":"b","residual":3},{"metric":"c","residual":5}]"#,
    );

    pipeline.score_anomalies().await.expect("scored");

    assert_eq!(
        read_json(&data.join(ANOMALY_REPORT)),
        json!({
            "count": 3,
            "mean": 3.0,
            "std": 2.0,
            "records": [
                {"metric": "a", "residual": 1.0, "score": -1.0},
                {"metric": "b", "residual": 3.0, "score": 0.0},
                {"metric": "c", "residual": 5.0, "score": 1.0},
            ]
        })
    );
}

#[tokio::test]
async fn test_history_window_holds_latest_samples() {
    let dir = TempDir::new().expect("temp dir");
    let data = dir.path().join("perf");

    for (round, residual) in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0].into_iter().enumerate() {
        let millis = 1_000 * i64::try_from(round).expect("small");
        let pipeline = test_pipeline(&dir, millis, config());
        write_file(
            &data.join(RESIDUALS),
            &format!(r#"[{{"metric":"api.p95","residual":{residual}}}]"#),
        );
        pipeline.update_history().await.expect("history updated");
    }

    let history = read_json(&data.join(HISTORY));
    assert_eq!(
        history["api.p95"],
        json!([
            {"timestamp": 2000, "value": 3.0},
            {"timestamp": 3000, "value": 4.0},
            {"timestamp": 4000, "value": 5.0},
            {"timestamp": 5000, "value": 6.0},
        ])
    );
}

#[tokio::test]
async fn test_thresholds_become_ready_and_publish_breach() {
    let dir = TempDir::new().expect("temp dir");
    let data = dir.path().join("perf");

    // Steady history for "api", a late spike in the final batch.
    for (round, residual) in [1.0, 3.0, 5.0].into_iter().enumerate() {
        let pipeline = test_pipeline(&dir, i64::try_from(round).expect("small"), config());
        write_file(
            &data.join(RESIDUALS),
            &format!(r#"[{{"metric":"api","residual":{residual}}},{{"metric":"db","residual":0}}]"#),
        );
        pipeline.update_history().await.expect("history updated");
    }
    let pipeline = test_pipeline(&dir, 10, config());
    pipeline.update_thresholds().await.expect("thresholds");

    let thresholds = read_json(&data.join(THRESHOLDS));
    assert_eq!(thresholds["minSamples"], json!(3));
    assert_eq!(
        thresholds["records"][0],
        json!({
            "metric": "api",
            "ready": true,
            "count": 3,
            "mean": 3.0,
            "std": 2.0,
            "upper": 5.0,
            "lower": 1.0
        })
    );

    write_file(
        &data.join(RESIDUALS),
        r#"[{"metric":"api","residual":9},{"metric":"db","residual":0}]"#,
    );
    pipeline.score_anomalies().await.expect("scored");

    let cache = GaugeCache::new();
    let outcome = pipeline.publish(&cache).await.expect("published");
    assert!(!outcome.is_skipped());

    let api = cache.threshold("api").expect("api threshold");
    assert_eq!(api.classify(9.0), Breach::Above);
    assert!(outcome.output().contains("perf_threshold_breach{metric=\"api\"} 1\n"));
    assert!(outcome.output().contains("perf_threshold_breach{metric=\"db\"} 0\n"));
}

#[tokio::test]
async fn test_run_chains_stages() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 42, config());
    let data = pipeline.config().data_dir.clone();
    write_file(
        &data.join(RESIDUALS),
        r#"[{"metric":"x","residual":-2},{"metric":"y","residual":2}]"#,
    );

    let cache = GaugeCache::new();
    let outcomes = pipeline.run(&cache).await.expect("run");

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| !o.is_skipped()));
    for key in [HISTORY, ANOMALY_REPORT, THRESHOLDS] {
        assert!(data.join(key).exists(), "{key} written");
    }
    assert!(cache.anomaly_score("y").expect("score") > 0.0);
    assert!(!cache.threshold("x").expect("threshold").ready);
}

#[tokio::test]
async fn test_rerun_rewrites_identical_bytes() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 7, config());
    let data = pipeline.config().data_dir.clone();
    write_file(
        &data.join(RESIDUALS),
        r#"[{"metric":"a","residual":0.25},{"metric":"b","residual":-1.5}]"#,
    );
    pipeline.update_history().await.expect("history");

    pipeline.score_anomalies().await.expect("scored");
    pipeline.update_thresholds().await.expect("thresholds");
    let anomaly = std::fs::read(data.join(ANOMALY_REPORT)).expect("read");
    let thresholds = std::fs::read(data.join(THRESHOLDS)).expect("read");

    pipeline.score_anomalies().await.expect("scored again");
    pipeline.update_thresholds().await.expect("thresholds again");

    assert_eq!(std::fs::read(data.join(ANOMALY_REPORT)).expect("read"), anomaly);
    assert_eq!(std::fs::read(data.join(THRESHOLDS)).expect("read"), thresholds);
}

#[tokio::test]
async fn test_extreme_residuals_reach_the_gauges() {
    let dir = TempDir::new().expect("temp dir");
    let pipeline = test_pipeline(&dir, 1_000, config());
    let data = pipeline.config().data_dir.clone();
    write_file(
        &data.join(RESIDUALS),
        r#"[{"metric":"a","residual":1e308},{"metric":"b","residual":-1e308}]"#,
    );

    pipeline.score_anomalies().await.expect("scored");

    let report = read_json(&data.join(ANOMALY_REPORT));
    assert!(report["std"].is_f64(), "{report}");

    let cache = GaugeCache::new();
    let refreshed = cache
        .refresh(pipeline.artifacts())
        .await
        .expect("refreshed");
    assert_eq!(refreshed.anomalies, SectionStatus::Loaded);
    let score = cache.anomaly_score("a").expect("score for a");
    assert!((score - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12, "{score}");
}
