//! Gauge cache for an external metrics exporter.
//!
//! The cache is an owned object: the process that exports gauges holds it,
//! calls [`GaugeCache::refresh`] when it wants fresher numbers, and reads
//! synchronously in between. There is no global state and nothing is pushed.
//!
//! Each section (capacity, anomalies, thresholds) is loaded independently.
//! Last successful load wins: a missing or malformed artifact leaves that
//! section as it was and does not affect the others.
//!
//! # Example
//!
//! ```
//! use perf_analytics::gauge::GaugeCache;
//!
//! let cache = GaugeCache::new();
//! assert!(cache.capacity().is_none());
//! assert!(cache.render_text().is_empty());
//! ```

// Allow intentional numeric casts for gauge values
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::anomaly::{AnomalyRecord, AnomalyReport};
use crate::capacity::CapacityEstimate;
use crate::error::StorageError;
use crate::storage::artifacts::{self, ANOMALY_REPORT, CAPACITY_ESTIMATE, THRESHOLDS};
use crate::threshold::{ThresholdRecord, ThresholdReport};
use crate::traits::ArtifactStore;

/// Result of loading one cache section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Replaced with the artifact's contents.
    Loaded,
    /// Artifact absent; previous contents kept.
    Missing,
    /// Artifact unparseable; previous contents kept.
    Malformed,
}

/// Per-section outcome of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Capacity section.
    pub capacity: SectionStatus,
    /// Anomaly section.
    pub anomalies: SectionStatus,
    /// Threshold section.
    pub thresholds: SectionStatus,
}

/// Point-in-time copy of the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaugeSnapshot {
    /// Latest capacity estimate.
    pub capacity: Option<CapacityEstimate>,
    /// Latest anomaly record per metric.
    pub anomalies: BTreeMap<String, AnomalyRecord>,
    /// Latest threshold record per metric.
    pub thresholds: BTreeMap<String, ThresholdRecord>,
}

/// One exported gauge value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeSample {
    /// Gauge name.
    pub name: &'static str,
    /// `metric` label, if the gauge is per metric.
    pub metric: Option<String>,
    /// Value.
    pub value: f64,
}

impl GaugeSample {
    const fn global(name: &'static str, value: f64) -> Self {
        Self {
            name,
            metric: None,
            value,
        }
    }

    fn per_metric(name: &'static str, metric: &str, value: f64) -> Self {
        Self {
            name,
            metric: Some(metric.to_string()),
            value,
        }
    }
}

/// Read-oriented cache of the latest derived values.
#[derive(Debug, Default)]
pub struct GaugeCache {
    inner: RwLock<GaugeSnapshot>,
}

impl GaugeCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload every section from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] only when the store itself fails to read;
    /// missing or malformed artifacts are reported per section instead.
    pub async fn refresh<S>(&self, store: &S) -> Result<RefreshReport, StorageError>
    where
        S: ArtifactStore + ?Sized,
    {
        let (capacity_status, capacity) =
            load_section::<CapacityEstimate, _>(store, CAPACITY_ESTIMATE).await?;
        let (anomalies_status, anomalies) =
            load_section::<AnomalyReport, _>(store, ANOMALY_REPORT).await?;
        let (thresholds_status, thresholds) =
            load_section::<ThresholdReport, _>(store, THRESHOLDS).await?;

        {
            let mut snapshot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(capacity) = capacity {
                snapshot.capacity = Some(capacity);
            }
            // Later records for the same metric win.
            if let Some(report) = anomalies {
                snapshot.anomalies = report
                    .records
                    .into_iter()
                    .map(|r| (r.metric.clone(), r))
                    .collect();
            }
            if let Some(report) = thresholds {
                snapshot.thresholds = report
                    .records
                    .into_iter()
                    .map(|r| (r.metric.clone(), r))
                    .collect();
            }
        }

        let report = RefreshReport {
            capacity: capacity_status,
            anomalies: anomalies_status,
            thresholds: thresholds_status,
        };
        tracing::info!(
            capacity = ?report.capacity,
            anomalies = ?report.anomalies,
            thresholds = ?report.thresholds,
            "Gauge cache refreshed"
        );
        Ok(report)
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> GaugeSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest capacity estimate.
    #[must_use]
    pub fn capacity(&self) -> Option<CapacityEstimate> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity
            .clone()
    }

    /// Latest anomaly score for a metric.
    #[must_use]
    pub fn anomaly_score(&self, metric: &str) -> Option<f64> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .anomalies
            .get(metric)
            .map(|r| r.score)
    }

    /// Latest threshold record for a metric.
    #[must_use]
    pub fn threshold(&self, metric: &str) -> Option<ThresholdRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .thresholds
            .get(metric)
            .cloned()
    }

    /// Flatten the cache into gauge samples.
    ///
    /// Threshold bands are only exported for ready metrics. The breach gauge
    /// is exported for metrics that have both a residual and a ready band.
    #[must_use]
    pub fn gauges(&self) -> Vec<GaugeSample> {
        let snapshot = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut gauges = Vec::new();

        if let Some(capacity) = &snapshot.capacity {
            gauges.push(GaugeSample::global(
                "perf_capacity_max_stable_rps",
                capacity.max_stable_rps,
            ));
            gauges.push(GaugeSample::global(
                "perf_capacity_optimal_connections",
                capacity.optimal_connections as f64,
            ));
            gauges.push(GaugeSample::global(
                "perf_capacity_suggestion_code",
                f64::from(u8::from(capacity.suggestion_code)),
            ));
        }

        for (metric, record) in &snapshot.anomalies {
            gauges.push(GaugeSample::per_metric("perf_anomaly_residual", metric, record.residual));
            gauges.push(GaugeSample::per_metric("perf_anomaly_score", metric, record.score));
        }

        for (metric, record) in &snapshot.thresholds {
            gauges.push(GaugeSample::per_metric(
                "perf_threshold_ready",
                metric,
                if record.ready { 1.0 } else { 0.0 },
            ));
            gauges.push(GaugeSample::per_metric(
                "perf_threshold_samples",
                metric,
                record.count as f64,
            ));
            for (name, value) in [
                ("perf_threshold_mean", record.mean),
                ("perf_threshold_std", record.std),
                ("perf_threshold_upper", record.upper),
                ("perf_threshold_lower", record.lower),
            ] {
                if let Some(value) = value {
                    gauges.push(GaugeSample::per_metric(name, metric, value));
                }
            }
            let breach = snapshot
                .anomalies
                .get(metric)
                .and_then(|a| record.classify(a.residual).gauge_value());
            if let Some(value) = breach {
                gauges.push(GaugeSample::per_metric("perf_threshold_breach", metric, value));
            }
        }

        gauges
    }

    /// Render gauges as exposition-format text lines.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for gauge in self.gauges() {
            match &gauge.metric {
                Some(metric) => {
                    let _ = writeln!(
                        out,
                        "{}{{metric=\"{}\"}} {}",
                        gauge.name,
                        escape_label(metric),
                        format_value(gauge.value)
                    );
                }
                None => {
                    let _ = writeln!(out, "{} {}", gauge.name, format_value(gauge.value));
                }
            }
        }
        out
    }
}

async fn load_section<T, S>(
    store: &S,
    key: &str,
) -> Result<(SectionStatus, Option<T>), StorageError>
where
    T: DeserializeOwned,
    S: ArtifactStore + ?Sized,
{
    match artifacts::load_json::<T, _>(store, key).await {
        Ok(Some(value)) => Ok((SectionStatus::Loaded, Some(value))),
        Ok(None) => {
            tracing::debug!(key, "Gauge section source missing, keeping previous values");
            Ok((SectionStatus::Missing, None))
        }
        Err(e) if e.is_malformed() => {
            tracing::warn!(error = %e, "Gauge section source malformed, keeping previous values");
            Ok((SectionStatus::Malformed, None))
        }
        Err(e) => Err(e),
    }
}

/// Exposition spelling of a sample value: `+Inf`, `-Inf`, `NaN`, and a
/// plain `0` for either signed zero.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
