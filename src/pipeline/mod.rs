//! Stage runners.
//!
//! Each stage reads its inputs from the artifact store, computes, and
//! overwrites its output artifact. Stages never call each other; the only
//! ordering is the one an external scheduler (or [`Pipeline::run`]) imposes.
//!
//! A missing required input is a soft skip ([`StageOutcome::Skipped`]), not
//! an error. Malformed stage inputs and computation failures are errors.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::anomaly::{score_batch, ResidualPoint};
use crate::baseline::{compare_latest, load_summaries, BaselineRecorder, PerfBaselineSummary};
use crate::capacity::{self, StepLoadResult};
use crate::config::Config;
use crate::error::{AppError, StageError, StorageError};
use crate::gauge::{GaugeCache, SectionStatus};
use crate::history::{MetricHistory, RollingHistoryStore};
use crate::storage::artifacts::{
    self, ANOMALY_REPORT, BASELINE_DELTA, CAPACITY_ESTIMATE, HISTORY, PERF_SUMMARY, RESIDUALS,
    STEP_LOAD_PREFIX, THRESHOLDS,
};
use crate::storage::FsArtifactStore;
use crate::threshold::compute_thresholds;
use crate::traits::{ArtifactStore, RealTimeProvider, TimeProvider};

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Append the residual batch to the rolling history.
    HistoryUpdate,
    /// Score the residual batch.
    AnomalyScore,
    /// Recompute adaptive thresholds from history.
    ThresholdUpdate,
    /// Estimate capacity from the latest step-load run.
    CapacityEstimate,
    /// Record a perf baseline.
    BaselineRecord,
    /// Compare the latest baselines per scenario.
    BaselineCompare,
    /// Refresh the gauge cache.
    Publish,
}

impl Stage {
    /// Command-line name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HistoryUpdate => "history-update",
            Self::AnomalyScore => "anomaly-score",
            Self::ThresholdUpdate => "threshold-update",
            Self::CapacityEstimate => "capacity-estimate",
            Self::BaselineRecord => "baseline-record",
            Self::BaselineCompare => "baseline-compare",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage wrote its output.
    Completed {
        /// Stage that ran.
        stage: Stage,
        /// Artifact written, if any.
        artifact: Option<String>,
        /// Text for stdout.
        output: String,
    },
    /// A required input was missing; nothing was written.
    Skipped {
        /// Stage that was skipped.
        stage: Stage,
        /// Diagnostic.
        reason: String,
    },
}

impl StageOutcome {
    fn skipped(stage: Stage, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(stage = %stage, reason = %reason, "Stage skipped");
        Self::Skipped { stage, reason }
    }

    fn completed(stage: Stage, artifact: Option<&str>, output: String) -> Self {
        tracing::info!(stage = %stage, artifact = ?artifact, "Stage completed");
        Self::Completed {
            stage,
            artifact: artifact.map(ToString::to_string),
            output,
        }
    }

    /// Returns true if the stage was skipped.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Stdout text, empty for skipped stages.
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::Completed { output, .. } => output,
            Self::Skipped { .. } => "",
        }
    }
}

/// Runs stages against an artifact store and a baseline store.
#[derive(Debug)]
pub struct Pipeline<S, T> {
    artifacts: S,
    baselines: S,
    clock: T,
    config: Config,
}

impl Pipeline<FsArtifactStore, RealTimeProvider> {
    /// Pipeline over the directories named in `config`.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self::new(
            FsArtifactStore::new(&config.data_dir),
            FsArtifactStore::new(&config.baseline_dir),
            RealTimeProvider,
            config,
        )
    }
}

impl<S, T> Pipeline<S, T>
where
    S: ArtifactStore,
    T: TimeProvider,
{
    /// Create a pipeline.
    pub const fn new(artifacts: S, baselines: S, clock: T, config: Config) -> Self {
        Self {
            artifacts,
            baselines,
            clock,
            config,
        }
    }

    /// Store holding stage artifacts.
    pub const fn artifacts(&self) -> &S {
        &self.artifacts
    }

    /// Store holding baseline summaries.
    pub const fn baselines(&self) -> &S {
        &self.baselines
    }

    /// Active configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Append the residual batch to the rolling history.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the residual batch is malformed or the
    /// history cannot be read or written.
    pub async fn update_history(&self) -> Result<StageOutcome, AppError> {
        let Some(batch) = self.load_residuals().await? else {
            return Ok(StageOutcome::skipped(
                Stage::HistoryUpdate,
                format!("{RESIDUALS} not found"),
            ));
        };

        let store = RollingHistoryStore::new(&self.artifacts, self.config.max_samples);
        let timestamp_ms = self.clock.now().timestamp_millis();
        let (history, _) = store.update(&batch, timestamp_ms).await?;

        Ok(StageOutcome::completed(
            Stage::HistoryUpdate,
            Some(HISTORY),
            render(HISTORY, &history)?,
        ))
    }

    /// Score the residual batch and overwrite the anomaly report.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the residual batch is malformed, its
    /// statistics are not finite, or the report cannot be written.
    pub async fn score_anomalies(&self) -> Result<StageOutcome, AppError> {
        let Some(batch) = self.load_residuals().await? else {
            return Ok(StageOutcome::skipped(
                Stage::AnomalyScore,
                format!("{RESIDUALS} not found"),
            ));
        };

        let report = score_batch(&batch);
        if !report.is_finite() {
            return Err(StageError::InvalidInput {
                artifact: RESIDUALS.to_string(),
                reason: "residual spread exceeds the f64 range".into(),
            }
            .into());
        }
        if let Some(top) = report.most_extreme() {
            tracing::debug!(metric = %top.metric, score = top.score, "Most extreme residual");
        }
        let bytes = artifacts::save_json(&self.artifacts, ANOMALY_REPORT, &report).await?;

        Ok(StageOutcome::completed(
            Stage::AnomalyScore,
            Some(ANOMALY_REPORT),
            into_text(bytes),
        ))
    }

    /// Recompute adaptive thresholds from the rolling history.
    ///
    /// A corrupt history is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the history cannot be read, a band is not
    /// finite, or the thresholds cannot be written.
    pub async fn update_thresholds(&self) -> Result<StageOutcome, AppError> {
        let history =
            match artifacts::load_json::<MetricHistory, _>(&self.artifacts, HISTORY).await {
                Ok(Some(history)) => history,
                Ok(None) => {
                    return Ok(StageOutcome::skipped(
                        Stage::ThresholdUpdate,
                        format!("{HISTORY} not found"),
                    ));
                }
                Err(e) if e.is_malformed() => {
                    tracing::warn!(error = %e, "Rolling history is corrupt, treating as empty");
                    MetricHistory::default()
                }
                Err(e) => return Err(e.into()),
            };

        let report = compute_thresholds(&history, &self.config.threshold_settings());
        if let Some(record) = report.records.iter().find(|r| !r.is_finite()) {
            return Err(StageError::InvalidInput {
                artifact: HISTORY.to_string(),
                reason: format!("threshold band for {} exceeds the f64 range", record.metric),
            }
            .into());
        }
        tracing::info!(
            metrics = report.records.len(),
            ready = report.ready_count(),
            "Thresholds recomputed"
        );
        let bytes = artifacts::save_json(&self.artifacts, THRESHOLDS, &report).await?;

        Ok(StageOutcome::completed(
            Stage::ThresholdUpdate,
            Some(THRESHOLDS),
            into_text(bytes),
        ))
    }

    /// Estimate capacity from the lexicographically last step-load file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the step-load file is malformed, no step was
    /// stable, or the estimate cannot be written.
    pub async fn estimate_capacity(&self) -> Result<StageOutcome, AppError> {
        let latest = self
            .artifacts
            .list(STEP_LOAD_PREFIX)
            .await?
            .into_iter()
            .rev()
            .find(|key| artifacts::is_step_load_key(key));
        let Some(key) = latest else {
            return Ok(StageOutcome::skipped(
                Stage::CapacityEstimate,
                format!("no {STEP_LOAD_PREFIX}*.json results found"),
            ));
        };

        let Some(steps) =
            artifacts::load_json::<Vec<StepLoadResult>, _>(&self.artifacts, &key).await?
        else {
            return Ok(StageOutcome::skipped(
                Stage::CapacityEstimate,
                format!("{key} disappeared"),
            ));
        };
        tracing::info!(key = %key, steps = steps.len(), "Loaded step-load results");

        let estimate = capacity::estimate_capacity(&steps, &self.config.capacity_policy())?;
        let bytes = artifacts::save_json(&self.artifacts, CAPACITY_ESTIMATE, &estimate).await?;

        Ok(StageOutcome::completed(
            Stage::CapacityEstimate,
            Some(CAPACITY_ESTIMATE),
            into_text(bytes),
        ))
    }

    /// Record a perf baseline.
    ///
    /// The summary comes from `source` if given, otherwise from
    /// `perf_summary.json` in the artifact store. `scenario` overrides the
    /// summary's own scenario.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the summary is malformed or cannot be
    /// recorded.
    pub async fn record_baseline(
        &self,
        source: Option<&Path>,
        scenario: Option<&str>,
    ) -> Result<StageOutcome, AppError> {
        let loaded = match source {
            Some(path) => read_summary_file(path).await?,
            None => {
                artifacts::load_json::<PerfBaselineSummary, _>(&self.artifacts, PERF_SUMMARY)
                    .await?
            }
        };
        let Some(mut summary) = loaded else {
            let name = source.map_or_else(|| PERF_SUMMARY.to_string(), |p| p.display().to_string());
            return Ok(StageOutcome::skipped(
                Stage::BaselineRecord,
                format!("{name} not found"),
            ));
        };
        if let Some(scenario) = scenario {
            summary.scenario = scenario.to_string();
        }

        let recorder = BaselineRecorder::new(&self.baselines, &self.clock);
        let key = recorder.record(&summary).await?;

        Ok(StageOutcome::completed(
            Stage::BaselineRecord,
            Some(&key),
            render(&key, &summary)?,
        ))
    }

    /// Compare the two newest baselines of every scenario.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if baselines cannot be listed or the delta
    /// report cannot be written.
    pub async fn compare_baselines(&self) -> Result<StageOutcome, AppError> {
        let summaries = load_summaries(&self.baselines).await?;
        if summaries.is_empty() {
            return Ok(StageOutcome::skipped(
                Stage::BaselineCompare,
                "no baselines recorded",
            ));
        }

        let report = compare_latest(&summaries);
        tracing::info!(
            compared = report.scenarios.len(),
            skipped = report.skipped.len(),
            "Baselines compared"
        );
        let bytes = artifacts::save_json(&self.artifacts, BASELINE_DELTA, &report).await?;

        Ok(StageOutcome::completed(
            Stage::BaselineCompare,
            Some(BASELINE_DELTA),
            into_text(bytes),
        ))
    }

    /// Refresh `cache` from the latest artifacts.
    ///
    /// Skipped only when none of the sections has a source artifact.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the store cannot be read.
    pub async fn publish(&self, cache: &GaugeCache) -> Result<StageOutcome, AppError> {
        let report = cache.refresh(&self.artifacts).await?;
        let all_missing = [report.capacity, report.anomalies, report.thresholds]
            .iter()
            .all(|s| *s == SectionStatus::Missing);
        if all_missing {
            return Ok(StageOutcome::skipped(
                Stage::Publish,
                "no derived artifacts to publish",
            ));
        }

        Ok(StageOutcome::completed(
            Stage::Publish,
            None,
            cache.render_text(),
        ))
    }

    /// Run history update, anomaly scoring, threshold update and publish in
    /// that order.
    ///
    /// # Errors
    ///
    /// Stops at the first stage that fails.
    pub async fn run(&self, cache: &GaugeCache) -> Result<Vec<StageOutcome>, AppError> {
        Ok(vec![
            self.update_history().await?,
            self.score_anomalies().await?,
            self.update_thresholds().await?,
            self.publish(cache).await?,
        ])
    }

    async fn load_residuals(&self) -> Result<Option<Vec<ResidualPoint>>, AppError> {
        let Some(batch) =
            artifacts::load_json::<Vec<ResidualPoint>, _>(&self.artifacts, RESIDUALS).await?
        else {
            return Ok(None);
        };
        if let Some(index) = batch.iter().position(|p| p.metric.is_empty()) {
            return Err(StageError::InvalidInput {
                artifact: RESIDUALS.to_string(),
                reason: format!("entry {index} has an empty metric name"),
            }
            .into());
        }
        Ok(Some(batch))
    }
}

async fn read_summary_file(path: &Path) -> Result<Option<PerfBaselineSummary>, StorageError> {
    let key = path.display().to_string();
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StorageError::ReadFailed {
                key,
                message: e.to_string(),
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StorageError::Malformed {
            key,
            message: e.to_string(),
        })
}

fn render<T: Serialize>(key: &str, value: &T) -> Result<String, StorageError> {
    artifacts::to_json_bytes(value)
        .map(into_text)
        .map_err(|e| StorageError::WriteFailed {
            key: key.to_string(),
            message: format!("serialization failed: {e}"),
        })
}

fn into_text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyReport;
    use crate::baseline::DeltaReport;
    use crate::capacity::{CapacityEstimate, SuggestionCode};
    use crate::storage::MemoryArtifactStore;
    use crate::threshold::ThresholdReport;
    use crate::traits::FixedTimeProvider;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn pipeline() -> Pipeline<MemoryArtifactStore, FixedTimeProvider> {
        let config = Config {
            min_samples: 2,
            max_samples: 3,
            ..Config::default()
        };
        Pipeline::new(
            MemoryArtifactStore::new(),
            MemoryArtifactStore::new(),
            FixedTimeProvider(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()),
            config,
        )
    }

    async fn put(store: &MemoryArtifactStore, key: &str, json: &str) {
        store.write(key, json.as_bytes()).await.unwrap();
    }

    async fn get<T: serde::de::DeserializeOwned>(store: &MemoryArtifactStore, key: &str) -> T {
        artifacts::load_json(store, key).await.unwrap().unwrap()
    }

    const BATCH: &str = r#"[
        {"metric": "a", "residual": 1.0},
        {"metric": "b", "residual": 3.0},
        {"metric": "c", "residual": 5.0}
    ]"#;

    #[tokio::test]
    async fn test_missing_inputs_skip() {
        let p = pipeline();
        let cache = GaugeCache::new();

        for outcome in [
            p.update_history().await.unwrap(),
            p.score_anomalies().await.unwrap(),
            p.update_thresholds().await.unwrap(),
            p.estimate_capacity().await.unwrap(),
            p.record_baseline(None, None).await.unwrap(),
            p.compare_baselines().await.unwrap(),
            p.publish(&cache).await.unwrap(),
        ] {
            assert!(outcome.is_skipped(), "{outcome:?}");
            assert_eq!(outcome.output(), "");
        }
        assert!(p.artifacts().is_empty());
        assert!(p.baselines().is_empty());
    }

    #[tokio::test]
    async fn test_extreme_residuals_round_trip() {
        let p = pipeline();
        put(
            p.artifacts(),
            RESIDUALS,
            r#"[{"metric":"a","residual":1e308},{"metric":"b","residual":-1e308}]"#,
        )
        .await;

        p.score_anomalies().await.unwrap();

        let report: AnomalyReport = get(p.artifacts(), ANOMALY_REPORT).await;
        assert!(report.std.is_finite());
        assert!(report.records[0].score > 0.7 && report.records[1].score < -0.7);
    }

    #[tokio::test]
    async fn test_unrepresentable_residual_spread_fails() {
        let p = pipeline();
        put(
            p.artifacts(),
            RESIDUALS,
            r#"[
                {"metric":"a","residual":1.7e308},
                {"metric":"b","residual":-1.7e308},
                {"metric":"c","residual":1.7e308},
                {"metric":"d","residual":-1.7e308}
            ]"#,
        )
        .await;

        let err = p.score_anomalies().await.unwrap_err();

        assert!(matches!(err, AppError::Stage(StageError::InvalidInput { .. })), "{err}");
        assert!(p.artifacts().read(ANOMALY_REPORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overflowing_threshold_band_fails() {
        let p = pipeline();
        put(
            p.artifacts(),
            HISTORY,
            r#"{"m": [{"timestamp": 0, "value": 1e308}, {"timestamp": 1, "value": -1e308}]}"#,
        )
        .await;

        let err = p.update_thresholds().await.unwrap_err();

        assert!(
            matches!(
                err,
                AppError::Stage(StageError::InvalidInput { ref artifact, .. }) if artifact == HISTORY
            ),
            "{err}"
        );
        assert_eq!(err.exit_code(), 1);
        assert!(p.artifacts().read(THRESHOLDS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_residuals_fail() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, "[{\"metric\": ").await;

        let err = p.score_anomalies().await.unwrap_err();
        assert!(matches!(err, AppError::Storage(StorageError::Malformed { .. })));
        assert_eq!(err.exit_code(), 1);
        assert!(p.artifacts().read(ANOMALY_REPORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_metric_name_is_invalid() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, r#"[{"metric": "", "residual": 1.0}]"#).await;

        let err = p.update_history().await.unwrap_err();
        assert!(matches!(err, AppError::Stage(StageError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_score_anomalies_writes_report() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, BATCH).await;

        let outcome = p.score_anomalies().await.unwrap();

        let report: AnomalyReport = get(p.artifacts(), ANOMALY_REPORT).await;
        let scores: Vec<f64> = report.records.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![-1.0, 0.0, 1.0]);
        let written = p.artifacts().read(ANOMALY_REPORT).await.unwrap().unwrap();
        assert_eq!(outcome.output().as_bytes(), written.as_slice());
    }

    #[tokio::test]
    async fn test_empty_batch_writes_empty_report() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, "[]").await;

        p.score_anomalies().await.unwrap();
        let report: AnomalyReport = get(p.artifacts(), ANOMALY_REPORT).await;
        assert_eq!(report, AnomalyReport::default());
    }

    #[tokio::test]
    async fn test_history_then_thresholds() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, BATCH).await;

        p.update_history().await.unwrap();
        let outcome = p.update_thresholds().await.unwrap();
        assert!(!outcome.is_skipped());
        let report: ThresholdReport = get(p.artifacts(), THRESHOLDS).await;
        // One sample per metric, min_samples is 2.
        assert_eq!(report.ready_count(), 0);

        p.update_history().await.unwrap();
        let report: ThresholdReport = get(p.artifacts(), THRESHOLDS).await;
        assert_eq!(report.ready_count(), 0);

        p.update_thresholds().await.unwrap();
        let report: ThresholdReport = get(p.artifacts(), THRESHOLDS).await;
        assert_eq!(report.ready_count(), 3);
        let a = report.get("a").unwrap();
        assert_eq!(a.mean, Some(1.0));
        assert_eq!(a.std, Some(0.0));
    }

    #[tokio::test]
    async fn test_history_respects_capacity() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, BATCH).await;

        for _ in 0..5 {
            p.update_history().await.unwrap();
        }

        let history: MetricHistory = get(p.artifacts(), HISTORY).await;
        assert_eq!(history.samples("a").unwrap().len(), 3);
        assert_eq!(history.sample_count(), 9);
    }

    #[tokio::test]
    async fn test_corrupt_history_thresholds_empty() {
        let p = pipeline();
        put(p.artifacts(), HISTORY, "not json").await;

        let outcome = p.update_thresholds().await.unwrap();
        assert!(!outcome.is_skipped());
        let report: ThresholdReport = get(p.artifacts(), THRESHOLDS).await;
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_uses_latest_step_load() {
        let p = pipeline();
        put(
            p.artifacts(),
            "step-load-2024-01-01.json",
            r#"[{"connections": 10, "rps": 500.0}]"#,
        )
        .await;
        put(
            p.artifacts(),
            "step-load-2024-02-01.json",
            r#"[{"connections": 10, "rps": 40.0}, {"connections": 20, "rps": 90.0},
               {"connections": 30, "rps": 95.0, "errors": 2}]"#,
        )
        .await;

        p.estimate_capacity().await.unwrap();

        let estimate: CapacityEstimate = get(p.artifacts(), CAPACITY_ESTIMATE).await;
        assert_eq!(estimate.max_stable_rps, 90.0);
        assert_eq!(estimate.optimal_connections, 20);
        assert_eq!(estimate.suggestion_code, SuggestionCode::Approaching);
    }

    #[tokio::test]
    async fn test_capacity_without_stable_step_fails() {
        let p = pipeline();
        put(
            p.artifacts(),
            "step-load-1.json",
            r#"[{"connections": 10, "rps": 40.0, "timeouts": 1}]"#,
        )
        .await;

        let err = p.estimate_capacity().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Stage(StageError::NoStableCapacity { steps: 1 })
        ));
        assert!(p.artifacts().read(CAPACITY_ESTIMATE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_and_compare_baselines() {
        let p = pipeline();
        put(
            p.artifacts(),
            PERF_SUMMARY,
            r#"{"scenario": "health.check", "p50": 10.0, "p95": 20.0, "rpsAvg": 100.0, "rpsP95": 0.0, "duration": 30.0, "connections": 10}"#,
        )
        .await;
        p.record_baseline(None, None).await.unwrap();

        put(
            p.artifacts(),
            PERF_SUMMARY,
            r#"{"scenario": "health.check", "p50": 12.0, "p95": 20.0, "rpsAvg": 80.0, "rpsP95": 90.0, "duration": 30.0, "connections": 10}"#,
        )
        .await;
        let outcome = p.record_baseline(None, None).await.unwrap();
        assert!(!outcome.is_skipped());
        // Same clock instant: the second key is bumped by a millisecond.
        assert_eq!(p.baselines().len(), 2);

        p.compare_baselines().await.unwrap();
        let report: DeltaReport = get(p.artifacts(), BASELINE_DELTA).await;
        let delta = &report.scenarios["health.check"];
        assert_eq!(delta.p50.pct, Some(20.0));
        assert_eq!(delta.rps_avg.pct, Some(-20.0));
        assert_eq!(delta.rps_p95.pct, None);
    }

    #[tokio::test]
    async fn test_record_baseline_scenario_override() {
        let p = pipeline();
        put(
            p.artifacts(),
            PERF_SUMMARY,
            r#"{"p50": 1.0, "p95": 2.0, "rpsAvg": 50.0, "rpsP95": 60.0, "duration": 10.0, "connections": 4}"#,
        )
        .await;

        let outcome = p.record_baseline(None, Some("login flow")).await.unwrap();
        let StageOutcome::Completed { artifact, .. } = outcome else {
            panic!("expected completion");
        };
        let key = artifact.unwrap();
        assert!(key.ends_with("-login_flow.json"), "{key}");
        let stored: PerfBaselineSummary = get(p.baselines(), &key).await;
        assert_eq!(stored.scenario, "login flow");
    }

    #[tokio::test]
    async fn test_record_baseline_without_metrics_fails() {
        let p = pipeline();
        put(p.artifacts(), PERF_SUMMARY, r#"{"scenario": "x"}"#).await;

        let err = p.record_baseline(None, None).await.unwrap_err();

        assert!(matches!(err, AppError::Storage(ref e) if e.is_malformed()), "{err}");
        assert_eq!(err.exit_code(), 1);
        assert!(p.baselines().is_empty());
    }

    #[tokio::test]
    async fn test_record_baseline_from_missing_source_skips() {
        let p = pipeline();
        let dir = tempfile::TempDir::new().unwrap();
        let outcome = p
            .record_baseline(Some(&dir.path().join("nope.json")), None)
            .await
            .unwrap();
        assert!(outcome.is_skipped());
    }

    #[tokio::test]
    async fn test_run_publishes_gauges() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, BATCH).await;
        let cache = GaugeCache::new();

        let outcomes = p.run(&cache).await.unwrap();

        let stages: Vec<Stage> = outcomes
            .iter()
            .map(|o| match o {
                StageOutcome::Completed { stage, .. } | StageOutcome::Skipped { stage, .. } => {
                    *stage
                }
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                Stage::HistoryUpdate,
                Stage::AnomalyScore,
                Stage::ThresholdUpdate,
                Stage::Publish
            ]
        );
        assert!(outcomes.iter().all(|o| !o.is_skipped()));
        assert_eq!(cache.anomaly_score("c"), Some(1.0));
        assert!(outcomes[3].output().contains("perf_threshold_samples{metric=\"a\"} 1"));
    }

    #[tokio::test]
    async fn test_derived_stages_are_idempotent() {
        let p = pipeline();
        put(p.artifacts(), RESIDUALS, BATCH).await;
        put(
            p.artifacts(),
            "step-load-1.json",
            r#"[{"connections": 5, "rps": 120.0}]"#,
        )
        .await;
        p.update_history().await.unwrap();

        let keys = [ANOMALY_REPORT, THRESHOLDS, CAPACITY_ESTIMATE];
        let mut first = Vec::new();
        p.score_anomalies().await.unwrap();
        p.update_thresholds().await.unwrap();
        p.estimate_capacity().await.unwrap();
        for key in keys {
            first.push(p.artifacts().read(key).await.unwrap().unwrap());
        }

        p.score_anomalies().await.unwrap();
        p.update_thresholds().await.unwrap();
        p.estimate_capacity().await.unwrap();
        for (key, before) in keys.into_iter().zip(first) {
            assert_eq!(p.artifacts().read(key).await.unwrap().unwrap(), before, "{key}");
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::HistoryUpdate.to_string(), "history-update");
        assert_eq!(Stage::Publish.name(), "publish");
    }
}
