//! Capacity estimation from step-load results.
//!
//! A step-load test raises concurrency in discrete steps. The estimator takes
//! the *stable prefix* (the leading run of steps with zero errors and zero
//! timeouts) and reports the best throughput seen inside it. The first
//! failing step ends the scan: later steps ran after demonstrated
//! instability and are ignored even if they look clean.
//!
//! This is a heuristic, not a statistically rigorous changepoint detector.
//!
//! # Example
//!
//! ```
//! use perf_analytics::capacity::{estimate_capacity, CapacityPolicy, StepLoadResult, SuggestionCode};
//!
//! let steps = vec![
//!     StepLoadResult::new(10, 40.0, 12.0, 0, 0),
//!     StepLoadResult::new(20, 90.0, 25.0, 0, 0),
//!     StepLoadResult::new(30, 95.0, 80.0, 2, 0),
//! ];
//! let estimate = estimate_capacity(&steps, &CapacityPolicy::default()).unwrap();
//! assert_eq!(estimate.optimal_connections, 20);
//! assert_eq!(estimate.suggestion_code, SuggestionCode::Approaching);
//! ```

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_APPROACHING_BELOW_RPS, DEFAULT_SCALE_BELOW_RPS};
use crate::error::StageError;

/// One concurrency step of an external load test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepLoadResult {
    /// Concurrent connections injected.
    pub connections: u64,
    /// Achieved requests per second.
    pub rps: f64,
    /// 95th percentile latency (ms).
    #[serde(default)]
    pub p95: f64,
    /// Failed requests.
    #[serde(default)]
    pub errors: u64,
    /// Timed-out requests.
    #[serde(default)]
    pub timeouts: u64,
}

impl StepLoadResult {
    /// Create a step row.
    #[must_use]
    pub const fn new(connections: u64, rps: f64, p95: f64, errors: u64, timeouts: u64) -> Self {
        Self {
            connections,
            rps,
            p95,
            errors,
            timeouts,
        }
    }

    /// A step is stable when it saw no errors and no timeouts.
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        self.errors == 0 && self.timeouts == 0
    }
}

/// Coarse capacity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SuggestionCode {
    /// Enough headroom.
    Ok = 0,
    /// Approaching the limit.
    Approaching = 1,
    /// Scale out.
    ScaleRecommended = 2,
}

impl SuggestionCode {
    /// Machine-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Approaching => "approaching",
            Self::ScaleRecommended => "scale_recommended",
        }
    }
}

impl fmt::Display for SuggestionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<SuggestionCode> for u8 {
    fn from(code: SuggestionCode) -> Self {
        code as Self
    }
}

impl TryFrom<u8> for SuggestionCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Approaching),
            2 => Ok(Self::ScaleRecommended),
            other => Err(format!("invalid suggestion code {other}")),
        }
    }
}

/// Throughput cutoffs for [`SuggestionCode`].
///
/// Defaults are the fixed heuristics `< 50` (scale) and `< 100` (approaching).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityPolicy {
    /// Below this rps scaling is recommended.
    pub scale_below_rps: f64,
    /// Below this rps the limit is close.
    pub approaching_below_rps: f64,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            scale_below_rps: DEFAULT_SCALE_BELOW_RPS,
            approaching_below_rps: DEFAULT_APPROACHING_BELOW_RPS,
        }
    }
}

impl CapacityPolicy {
    /// Classify a sustainable throughput.
    #[must_use]
    pub fn classify(&self, max_stable_rps: f64) -> SuggestionCode {
        if max_stable_rps < self.scale_below_rps {
            SuggestionCode::ScaleRecommended
        } else if max_stable_rps < self.approaching_below_rps {
            SuggestionCode::Approaching
        } else {
            SuggestionCode::Ok
        }
    }
}

/// Sustainable capacity derived from the stable prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapacityEstimate {
    /// Highest rps within the stable prefix.
    pub max_stable_rps: f64,
    /// Connections of the first stable step reaching that rps.
    pub optimal_connections: u64,
    /// `0` ok, `1` approaching, `2` scale recommended.
    #[schemars(with = "u8")]
    pub suggestion_code: SuggestionCode,
    /// Label of `suggestion_code`.
    pub suggestion: String,
    /// Steps in the stable prefix.
    pub stable_steps: usize,
    /// Steps in the input.
    pub total_steps: usize,
}

/// Estimate capacity from steps ordered by ascending concurrency.
///
/// # Errors
///
/// Returns [`StageError::NoStableCapacity`] if the first step is already
/// unstable (or there are no steps).
pub fn estimate_capacity(
    steps: &[StepLoadResult],
    policy: &CapacityPolicy,
) -> Result<CapacityEstimate, StageError> {
    let stable: Vec<&StepLoadResult> = steps.iter().take_while(|s| s.is_stable()).collect();

    // First-encountered wins on ties: only a strictly higher rps replaces.
    let best = stable
        .iter()
        .copied()
        .reduce(|best, step| if step.rps > best.rps { step } else { best })
        .ok_or(StageError::NoStableCapacity { steps: steps.len() })?;

    let suggestion_code = policy.classify(best.rps);
    tracing::debug!(
        stable_steps = stable.len(),
        total_steps = steps.len(),
        max_stable_rps = best.rps,
        "Stable prefix scanned"
    );

    Ok(CapacityEstimate {
        max_stable_rps: best.rps,
        optimal_connections: best.connections,
        suggestion_code,
        suggestion: suggestion_code.label().to_string(),
        stable_steps: stable.len(),
        total_steps: steps.len(),
    })
}
