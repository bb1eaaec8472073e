//! Batch-relative anomaly scoring.
//!
//! Scores answer "how extreme is this metric relative to its peers in this
//! measurement round". They use only the current residual batch, never the
//! rolling history; the longitudinal view lives in [`crate::threshold`].
//!
//! # Example
//!
//! ```
//! use perf_analytics::anomaly::{score_batch, ResidualPoint};
//!
//! let report = score_batch(&[
//!     ResidualPoint::new("a", 1.0),
//!     ResidualPoint::new("b", 3.0),
//!     ResidualPoint::new("c", 5.0),
//! ]);
//! let scores: Vec<f64> = report.records.iter().map(|r| r.score).collect();
//! assert_eq!(scores, vec![-1.0, 0.0, 1.0]);
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::stats::Summary;

/// Observed-minus-forecast value for one metric in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResidualPoint {
    /// Metric name.
    pub metric: String,
    /// Residual value.
    pub residual: f64,
}

impl ResidualPoint {
    /// Create a residual point.
    #[must_use]
    pub fn new(metric: impl Into<String>, residual: f64) -> Self {
        Self {
            metric: metric.into(),
            residual,
        }
    }
}

/// Anomaly score for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnomalyRecord {
    /// Metric name.
    pub metric: String,
    /// Residual from the batch.
    pub residual: f64,
    /// Standardized deviation from the batch mean; `0` when the batch has
    /// no spread.
    pub score: f64,
}

/// Scores for one residual batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnomalyReport {
    /// Number of residuals scored.
    pub count: usize,
    /// Batch mean.
    pub mean: f64,
    /// Batch sample standard deviation.
    pub std: f64,
    /// Per-metric scores.
    pub records: Vec<AnomalyRecord>,
}

impl AnomalyReport {
    /// Record with the largest absolute score, if any.
    #[must_use]
    pub fn most_extreme(&self) -> Option<&AnomalyRecord> {
        self.records
            .iter()
            .max_by(|a, b| a.score.abs().total_cmp(&b.score.abs()))
    }

    /// Whether every statistic and score is finite, i.e. survives a JSON
    /// round trip.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.mean.is_finite()
            && self.std.is_finite()
            && self.records.iter().all(|r| r.score.is_finite())
    }
}

/// Score every residual against the batch mean and sample deviation.
///
/// An empty batch yields an empty report.
#[must_use]
pub fn score_batch(batch: &[ResidualPoint]) -> AnomalyReport {
    let values: Vec<f64> = batch.iter().map(|p| p.residual).collect();
    let summary = Summary::of(&values);

    let records = batch
        .iter()
        .map(|p| AnomalyRecord {
            metric: p.metric.clone(),
            residual: p.residual,
            score: summary.z_score(p.residual),
        })
        .collect();

    AnomalyReport {
        count: summary.count,
        mean: summary.mean,
        std: summary.std,
        records,
    }
}
