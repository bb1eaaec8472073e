//! Perf-benchmark baselines.
//!
//! This module provides:
//! - [`BaselineRecorder`]: append-only, timestamp-prefixed baseline files
//! - [`compare_latest`]: delta between the two newest summaries per scenario
//!
//! Filenames start with a fixed-width UTC timestamp, so a plain lexicographic
//! sort of the directory listing is chronological.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::artifacts::{self, EXTENSION};
use crate::traits::{ArtifactStore, TimeProvider};

/// Scenario used when a summary does not name one.
pub const UNKNOWN_SCENARIO: &str = "unknown";

/// Filename timestamp layout: fixed width, no `:` or `.`.
const KEY_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

fn unknown_scenario() -> String {
    UNKNOWN_SCENARIO.to_string()
}

/// Summary of one perf benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerfBaselineSummary {
    /// Scenario name, e.g. `health.check`.
    #[serde(default = "unknown_scenario")]
    pub scenario: String,
    /// Median latency (ms).
    pub p50: f64,
    /// 95th percentile latency (ms).
    pub p95: f64,
    /// Mean requests per second.
    pub rps_avg: f64,
    /// 95th percentile requests per second.
    pub rps_p95: f64,
    /// Run duration (s).
    pub duration: f64,
    /// Concurrent connections.
    pub connections: u64,
}

/// Baseline filename for a scenario recorded at `timestamp`.
///
/// Path separators and whitespace in the scenario are replaced with `_`.
#[must_use]
pub fn baseline_key(timestamp: DateTime<Utc>, scenario: &str) -> String {
    let scenario: String = scenario
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!(
        "{}-{scenario}{EXTENSION}",
        timestamp.format(KEY_TIMESTAMP_FORMAT)
    )
}

/// Layout of the timestamp prefix produced by [`baseline_key`]: `9` marks a
/// digit, every other byte must match exactly.
const KEY_PREFIX_LAYOUT: &[u8] = b"9999-99-99T99-99-99-999Z-";

/// Whether `key` has the layout written by [`baseline_key`].
///
/// Only such keys take part in comparisons, since their lexicographic
/// order is the recording order.
#[must_use]
pub fn is_baseline_key(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    let Some(stem) = name.strip_suffix(EXTENSION) else {
        return false;
    };
    let bytes = stem.as_bytes();
    bytes.len() >= KEY_PREFIX_LAYOUT.len()
        && KEY_PREFIX_LAYOUT
            .iter()
            .zip(bytes)
            .all(|(&layout, &b)| match layout {
                b'9' => b.is_ascii_digit(),
                _ => b == layout,
            })
}

/// Writes baseline summaries into an append-only store.
#[derive(Debug)]
pub struct BaselineRecorder<'a, S: ?Sized, T: ?Sized> {
    store: &'a S,
    clock: &'a T,
}

impl<'a, S, T> BaselineRecorder<'a, S, T>
where
    S: ArtifactStore + ?Sized,
    T: TimeProvider + ?Sized,
{
    /// Create a recorder.
    #[must_use]
    pub const fn new(store: &'a S, clock: &'a T) -> Self {
        Self { store, clock }
    }

    /// Persist a summary under a fresh timestamped key and return the key.
    ///
    /// Existing files are never overwritten: if the key is taken the
    /// timestamp is advanced by one millisecond until a free key is found.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read or written.
    pub async fn record(&self, summary: &PerfBaselineSummary) -> Result<String, StorageError> {
        let mut timestamp = self.clock.now();
        let mut key = baseline_key(timestamp, &summary.scenario);
        while self.store.read(&key).await?.is_some() {
            timestamp += Duration::milliseconds(1);
            key = baseline_key(timestamp, &summary.scenario);
        }

        artifacts::save_json(self.store, &key, summary).await?;
        tracing::info!(key = %key, scenario = %summary.scenario, "Baseline recorded");
        Ok(key)
    }
}

/// Change of one numeric field between two summaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldDelta {
    /// Older value.
    pub prev: f64,
    /// Newer value.
    pub curr: f64,
    /// Percentage change, `null` when `prev` is zero.
    pub pct: Option<f64>,
}

impl FieldDelta {
    /// Compute the delta between two values.
    #[must_use]
    pub fn between(prev: f64, curr: f64) -> Self {
        let pct = if prev == 0.0 {
            None
        } else {
            Some((curr - prev) / prev * 100.0)
        };
        Self { prev, curr, pct }
    }
}

/// Deltas for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDelta {
    /// Key of the older summary.
    pub previous: String,
    /// Key of the newer summary.
    pub current: String,
    /// Median latency.
    pub p50: FieldDelta,
    /// 95th percentile latency.
    pub p95: FieldDelta,
    /// Mean rps.
    pub rps_avg: FieldDelta,
    /// 95th percentile rps.
    pub rps_p95: FieldDelta,
}

impl ScenarioDelta {
    fn between(
        previous: (&str, &PerfBaselineSummary),
        current: (&str, &PerfBaselineSummary),
    ) -> Self {
        let (prev_key, prev) = previous;
        let (curr_key, curr) = current;
        Self {
            previous: prev_key.to_string(),
            current: curr_key.to_string(),
            p50: FieldDelta::between(prev.p50, curr.p50),
            p95: FieldDelta::between(prev.p95, curr.p95),
            rps_avg: FieldDelta::between(prev.rps_avg, curr.rps_avg),
            rps_p95: FieldDelta::between(prev.rps_p95, curr.rps_p95),
        }
    }
}

/// Per-scenario deltas, keyed by scenario name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeltaReport {
    /// Scenarios with at least two summaries.
    pub scenarios: BTreeMap<String, ScenarioDelta>,
    /// Scenarios skipped for having a single summary.
    pub skipped: Vec<String>,
}

/// Compare the two newest summaries of every scenario.
///
/// `summaries` must be sorted by key (chronological). Scenarios with fewer
/// than two summaries are listed in `skipped`, not reported as zero deltas.
#[must_use]
pub fn compare_latest(summaries: &[(String, PerfBaselineSummary)]) -> DeltaReport {
    let mut by_scenario: BTreeMap<&str, Vec<(&str, &PerfBaselineSummary)>> = BTreeMap::new();
    for (key, summary) in summaries {
        by_scenario
            .entry(summary.scenario.as_str())
            .or_default()
            .push((key.as_str(), summary));
    }

    let mut report = DeltaReport::default();
    for (scenario, entries) in by_scenario {
        match entries.as_slice() {
            [.., previous, current] => {
                report
                    .scenarios
                    .insert(scenario.to_string(), ScenarioDelta::between(*previous, *current));
            }
            _ => report.skipped.push(scenario.to_string()),
        }
    }
    report
}

/// Load every baseline summary in the store, sorted by key.
///
/// Keys that do not match the [`baseline_key`] layout are ignored.
/// Unparseable files are logged and skipped.
///
/// # Errors
///
/// Returns [`StorageError`] if listing or reading fails.
pub async fn load_summaries<S>(store: &S) -> Result<Vec<(String, PerfBaselineSummary)>, StorageError>
where
    S: ArtifactStore + ?Sized,
{
    let mut summaries = Vec::new();
    for key in store.list("").await? {
        if !is_baseline_key(&key) {
            tracing::debug!(key = %key, "Ignoring non-baseline file");
            continue;
        }
        match artifacts::load_json::<PerfBaselineSummary, _>(store, &key).await {
            Ok(Some(summary)) => summaries.push((key, summary)),
            Ok(None) => {}
            Err(e) if e.is_malformed() => {
                tracing::warn!(error = %e, "Skipping unreadable baseline");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summaries)
}
