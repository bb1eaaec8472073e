//! Rolling per-metric sample history.
//!
//! This module provides:
//! - [`MetricSample`]: a single timestamped value
//! - [`MetricHistory`]: bounded, time-ordered windows keyed by metric name
//! - [`RollingHistoryStore`]: load/append/trim/persist against an artifact store
//!
//! The persisted history is the pipeline's only durable state. A missing or
//! corrupt artifact is not an error: the store starts over from an empty
//! window rather than blocking every downstream stage.
//!
//! # Example
//!
//! ```
//! use perf_analytics::history::{MetricHistory, MetricSample};
//!
//! let mut history = MetricHistory::default();
//! for i in 0..5 {
//!     history.append("api.latency", MetricSample::new(i, i as f64), 3);
//! }
//! assert_eq!(history.values("api.latency"), vec![2.0, 3.0, 4.0]);
//! ```

use std::collections::{BTreeMap, VecDeque};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::anomaly::ResidualPoint;
use crate::error::StorageError;
use crate::storage::artifacts::{self, HISTORY};
use crate::traits::ArtifactStore;

/// One observed value. Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricSample {
    /// Observation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Observed value.
    pub value: f64,
}

impl MetricSample {
    /// Create a sample.
    #[must_use]
    pub const fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Bounded sample windows keyed by metric name.
///
/// Insertion order is time order. Metrics are kept in name order so the
/// serialized form is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MetricHistory {
    metrics: BTreeMap<String, VecDeque<MetricSample>>,
}

impl MetricHistory {
    /// Append a sample to a metric's window, then drop the oldest samples
    /// until the window holds at most `max_samples`.
    pub fn append(&mut self, metric: &str, sample: MetricSample, max_samples: usize) {
        let window = self.metrics.entry(metric.to_string()).or_default();
        window.push_back(sample);
        trim_front(window, max_samples);
    }

    /// Trim every window to `max_samples`.
    ///
    /// Returns the number of samples dropped.
    pub fn enforce_capacity(&mut self, max_samples: usize) -> usize {
        self.metrics
            .values_mut()
            .map(|window| trim_front(window, max_samples))
            .sum()
    }

    /// Samples for a metric, oldest first.
    #[must_use]
    pub fn samples(&self, metric: &str) -> Option<&VecDeque<MetricSample>> {
        self.metrics.get(metric)
    }

    /// Sample values for a metric, oldest first (empty if unknown).
    #[must_use]
    pub fn values(&self, metric: &str) -> Vec<f64> {
        self.metrics
            .get(metric)
            .map(|w| w.iter().map(|s| s.value).collect())
            .unwrap_or_default()
    }

    /// Iterate metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VecDeque<MetricSample>)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of tracked metrics.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Total samples across all metrics.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.metrics.values().map(VecDeque::len).sum()
    }

    /// Returns true if no metric has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

fn trim_front(window: &mut VecDeque<MetricSample>, max_samples: usize) -> usize {
    let overflow = window.len().saturating_sub(max_samples);
    window.drain(..overflow);
    overflow
}

/// Outcome of a history update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryUpdate {
    /// Samples appended from the batch.
    pub appended: usize,
    /// Samples dropped to honor the capacity.
    pub trimmed: usize,
    /// Metrics tracked after the update.
    pub metrics: usize,
    /// Samples held after the update.
    pub samples: usize,
}

/// Persistent rolling history over an [`ArtifactStore`].
#[derive(Debug)]
pub struct RollingHistoryStore<'a, S: ?Sized> {
    store: &'a S,
    max_samples: usize,
}

impl<'a, S: ArtifactStore + ?Sized> RollingHistoryStore<'a, S> {
    /// Create a store holding at most `max_samples` per metric.
    #[must_use]
    pub const fn new(store: &'a S, max_samples: usize) -> Self {
        Self { store, max_samples }
    }

    /// Load the persisted history.
    ///
    /// A missing or unparseable artifact yields an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the artifact exists but the
    /// store cannot read it.
    pub async fn load(&self) -> Result<MetricHistory, StorageError> {
        match artifacts::load_json::<MetricHistory, _>(self.store, HISTORY).await {
            Ok(Some(history)) => Ok(history),
            Ok(None) => {
                tracing::info!(key = HISTORY, "No rolling history yet, starting empty");
                Ok(MetricHistory::default())
            }
            Err(e) if e.is_malformed() => {
                tracing::warn!(error = %e, "Rolling history is corrupt, re-initializing");
                Ok(MetricHistory::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Append one sample per batch entry, trim, and rewrite the artifact.
    ///
    /// Every sample in the batch shares `timestamp_ms`. Metrics absent from
    /// the batch keep their window.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the history cannot be read or written.
    pub async fn update(
        &self,
        batch: &[ResidualPoint],
        timestamp_ms: i64,
    ) -> Result<(MetricHistory, HistoryUpdate), StorageError> {
        let mut history = self.load().await?;

        let mut trimmed = history.enforce_capacity(self.max_samples);
        for point in batch {
            let before = history.samples(&point.metric).map_or(0, VecDeque::len);
            history.append(
                &point.metric,
                MetricSample::new(timestamp_ms, point.residual),
                self.max_samples,
            );
            let after = history.samples(&point.metric).map_or(0, VecDeque::len);
            trimmed += before + 1 - after;
        }

        artifacts::save_json(self.store, HISTORY, &history).await?;

        let update = HistoryUpdate {
            appended: batch.len(),
            trimmed,
            metrics: history.metric_count(),
            samples: history.sample_count(),
        };
        tracing::info!(
            appended = update.appended,
            trimmed = update.trimmed,
            metrics = update.metrics,
            "Rolling history updated"
        );
        Ok((history, update))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
mod tests {
    use super::*;
    use crate::storage::MemoryArtifactStore;
    use crate::traits::MockArtifactStore;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn batch(points: &[(&str, f64)]) -> Vec<ResidualPoint> {
        points
            .iter()
            .map(|(m, r)| ResidualPoint::new(*m, *r))
            .collect()
    }

    #[test]
    fn test_append_trims_oldest_first() {
        let mut history = MetricHistory::default();
        for i in 0..10 {
            history.append("cpu", MetricSample::new(i, i as f64), 4);
        }
        assert_eq!(history.values("cpu"), vec![6.0, 7.0, 8.0, 9.0]);
        let timestamps: Vec<i64> = history
            .samples("cpu")
            .unwrap()
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(timestamps, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_metrics_are_independent() {
        let mut history = MetricHistory::default();
        history.append("a", MetricSample::new(1, 1.0), 2);
        history.append("a", MetricSample::new(2, 2.0), 2);
        history.append("a", MetricSample::new(3, 3.0), 2);
        history.append("b", MetricSample::new(3, 30.0), 2);

        assert_eq!(history.values("a"), vec![2.0, 3.0]);
        assert_eq!(history.values("b"), vec![30.0]);
        assert!(history.values("c").is_empty());
        assert_eq!(history.metric_count(), 2);
        assert_eq!(history.sample_count(), 3);
    }

    #[test]
    fn test_enforce_capacity_after_shrink() {
        let mut history = MetricHistory::default();
        for i in 0..6 {
            history.append("a", MetricSample::new(i, i as f64), 10);
        }
        assert_eq!(history.enforce_capacity(2), 4);
        assert_eq!(history.values("a"), vec![4.0, 5.0]);
    }

    #[test]
    fn test_serialized_shape() {
        let mut history = MetricHistory::default();
        history.append("b", MetricSample::new(2, 0.5), 5);
        history.append("a", MetricSample::new(1, 1.5), 5);

        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "a": [{"timestamp": 1, "value": 1.5}],
                "b": [{"timestamp": 2, "value": 0.5}],
            })
        );
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let store = MemoryArtifactStore::new();
        let history = RollingHistoryStore::new(&store, 5).load().await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_is_empty() {
        let store = MemoryArtifactStore::new();
        store.write(HISTORY, b"{\"a\": [ {\"timest").await.unwrap();

        let history = RollingHistoryStore::new(&store, 5).load().await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_load_read_failure_propagates() {
        let mut mock = MockArtifactStore::new();
        mock.expect_read().returning(|key| {
            Err(StorageError::ReadFailed {
                key: key.to_string(),
                message: "permission denied".into(),
            })
        });

        let result = RollingHistoryStore::new(&mock, 5).load().await;
        assert!(matches!(result, Err(StorageError::ReadFailed { .. })));
    }

    #[tokio::test]
    async fn test_update_persists_whole_history() {
        let store = MemoryArtifactStore::new();
        let rolling = RollingHistoryStore::new(&store, 2);

        rolling
            .update(&batch(&[("a", 1.0), ("b", 10.0)]), 1_000)
            .await
            .unwrap();
        let (history, update) = rolling
            .update(&batch(&[("a", 2.0)]), 2_000)
            .await
            .unwrap();

        assert_eq!(
            update,
            HistoryUpdate {
                appended: 1,
                trimmed: 0,
                metrics: 2,
                samples: 3,
            }
        );
        let persisted: MetricHistory = artifacts::load_json(&store, HISTORY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted, history);
        assert_eq!(persisted.values("b"), vec![10.0]);

        let (history, update) = rolling
            .update(&batch(&[("a", 3.0)]), 3_000)
            .await
            .unwrap();
        assert_eq!(update.trimmed, 1);
        assert_eq!(history.values("a"), vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_update_recovers_from_corrupt_state() {
        let store = MemoryArtifactStore::new();
        store.write(HISTORY, b"not json at all").await.unwrap();

        let (history, _) = RollingHistoryStore::new(&store, 5)
            .update(&batch(&[("a", 1.0)]), 42)
            .await
            .unwrap();

        assert_eq!(history.sample_count(), 1);
        let persisted: MetricHistory = artifacts::load_json(&store, HISTORY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.samples("a").unwrap()[0], MetricSample::new(42, 1.0));
    }

    #[tokio::test]
    async fn test_update_write_failure_propagates() {
        let mut mock = MockArtifactStore::new();
        mock.expect_read().returning(|_| Ok(None));
        mock.expect_write().returning(|key, _| {
            Err(StorageError::WriteFailed {
                key: key.to_string(),
                message: "read-only".into(),
            })
        });

        let result = RollingHistoryStore::new(&mock, 5)
            .update(&batch(&[("a", 1.0)]), 1)
            .await;
        assert!(matches!(result, Err(StorageError::WriteFailed { .. })));
    }

    proptest! {
        #[test]
        fn prop_window_keeps_most_recent(
            values in proptest::collection::vec(-1.0e6f64..1.0e6, 0..200),
            max in 1usize..64,
        ) {
            let mut history = MetricHistory::default();
            for (i, v) in values.iter().enumerate() {
                history.append("m", MetricSample::new(i as i64, *v), max);
                prop_assert!(history.values("m").len() <= max);
            }

            let expected_len = values.len().min(max);
            let kept = history.values("m");
            prop_assert_eq!(kept.len(), expected_len);
            prop_assert_eq!(&kept[..], &values[values.len() - expected_len..]);
        }

        #[test]
        fn prop_persisted_window_is_bounded(
            rounds in 1usize..40,
            max in 1usize..16,
        ) {
            let store = MemoryArtifactStore::new();
            let rolling = RollingHistoryStore::new(&store, max);
            for round in 0..rounds {
                let points = batch(&[("m", round as f64)]);
                tokio_test::block_on(rolling.update(&points, round as i64)).unwrap();
            }

            let history = tokio_test::block_on(rolling.load()).unwrap();
            prop_assert_eq!(history.values("m").len(), rounds.min(max));
            prop_assert_eq!(history.values("m").last().copied(), Some((rounds - 1) as f64));
        }
    }
}
