//! Artifact names and typed JSON helpers.
//!
//! Every artifact is a pretty-printed JSON document terminated by a newline.
//! Serialization is deterministic (ordered maps, no timestamps added on
//! write), so re-running a stage on unchanged inputs rewrites identical bytes.

use std::fmt;
use std::str::FromStr;

use schemars::{schema_for, Schema};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::anomaly::{AnomalyReport, ResidualPoint};
use crate::baseline::{DeltaReport, PerfBaselineSummary};
use crate::capacity::{CapacityEstimate, StepLoadResult};
use crate::error::{CommandParseError, StorageError};
use crate::history::MetricHistory;
use crate::threshold::ThresholdReport;
use crate::traits::ArtifactStore;

/// Residual batch dropped by the forecasting job.
pub const RESIDUALS: &str = "residuals.json";

/// Rolling per-metric sample windows.
pub const HISTORY: &str = "metric_history.json";

/// Batch-relative anomaly scores.
pub const ANOMALY_REPORT: &str = "anomaly_report.json";

/// Adaptive per-metric thresholds.
pub const THRESHOLDS: &str = "adaptive_thresholds.json";

/// Capacity estimate from the latest step-load run.
pub const CAPACITY_ESTIMATE: &str = "capacity_estimate.json";

/// Baseline comparison output.
pub const BASELINE_DELTA: &str = "baseline_delta.json";

/// Default perf summary consumed by the baseline recorder.
pub const PERF_SUMMARY: &str = "perf_summary.json";

/// Filename prefix of step-load result files.
pub const STEP_LOAD_PREFIX: &str = "step-load";

/// Extension shared by every artifact.
pub const EXTENSION: &str = ".json";

/// Load and parse a JSON artifact.
///
/// Returns `Ok(None)` when the artifact does not exist.
///
/// # Errors
///
/// Returns [`StorageError::Malformed`] if the artifact does not parse as `T`,
/// or the store's read error.
pub async fn load_json<T, S>(store: &S, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    S: ArtifactStore + ?Sized,
{
    let Some(bytes) = store.read(key).await? else {
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Serialize a value and overwrite the artifact.
///
/// Returns the bytes that were written.
///
/// # Errors
///
/// Returns [`StorageError::WriteFailed`] if serialization or the write fails.
pub async fn save_json<T, S>(store: &S, key: &str, value: &T) -> Result<Vec<u8>, StorageError>
where
    T: Serialize + Sync,
    S: ArtifactStore + ?Sized,
{
    let bytes = to_json_bytes(value).map_err(|e| StorageError::WriteFailed {
        key: key.to_string(),
        message: format!("serialization failed: {e}"),
    })?;
    store.write(key, &bytes).await?;
    Ok(bytes)
}

/// Render a value the way artifacts are stored.
///
/// # Errors
///
/// Returns the serializer error for values JSON cannot represent.
pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Returns true if `key` names a step-load result file.
#[must_use]
pub fn is_step_load_key(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.starts_with(STEP_LOAD_PREFIX) && name.ends_with(EXTENSION)
}

/// Artifact kinds with a published schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Input residual batch.
    Residuals,
    /// Rolling history.
    History,
    /// Anomaly report.
    AnomalyReport,
    /// Adaptive thresholds.
    Thresholds,
    /// Step-load results (input).
    StepLoad,
    /// Capacity estimate.
    CapacityEstimate,
    /// Recorded perf baseline.
    Baseline,
    /// Baseline comparison.
    BaselineDelta,
}

impl Artifact {
    /// All artifact kinds.
    pub const ALL: [Self; 8] = [
        Self::Residuals,
        Self::History,
        Self::AnomalyReport,
        Self::Thresholds,
        Self::StepLoad,
        Self::CapacityEstimate,
        Self::Baseline,
        Self::BaselineDelta,
    ];

    /// Short name used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Residuals => "residuals",
            Self::History => "history",
            Self::AnomalyReport => "anomaly-report",
            Self::Thresholds => "thresholds",
            Self::StepLoad => "step-load",
            Self::CapacityEstimate => "capacity-estimate",
            Self::Baseline => "baseline",
            Self::BaselineDelta => "baseline-delta",
        }
    }

    /// JSON Schema of the artifact's contents.
    #[must_use]
    pub fn schema(self) -> Schema {
        match self {
            Self::Residuals => schema_for!(Vec<ResidualPoint>),
            Self::History => schema_for!(MetricHistory),
            Self::AnomalyReport => schema_for!(AnomalyReport),
            Self::Thresholds => schema_for!(ThresholdReport),
            Self::StepLoad => schema_for!(Vec<StepLoadResult>),
            Self::CapacityEstimate => schema_for!(CapacityEstimate),
            Self::Baseline => schema_for!(PerfBaselineSummary),
            Self::BaselineDelta => schema_for!(DeltaReport),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Artifact {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| CommandParseError::InvalidValue {
                flag: "schema".into(),
                value: s.to_string(),
            })
    }
}
