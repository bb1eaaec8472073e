//! Descriptive statistics shared by the scoring and threshold stages.
//!
//! Both stages use the *sample* standard deviation with the denominator
//! floored at one, so single-value and empty inputs yield `0.0` instead of
//! dividing by zero.
//!
//! Sums are taken directly first. If an intermediate overflows, the values
//! are rescaled by their largest magnitude and the sum is retried, so
//! finite inputs give finite results whenever the result is representable.

#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

/// Count, mean and sample standard deviation of a set of values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    /// Number of values.
    pub count: usize,
    /// Arithmetic mean (`0.0` when empty).
    pub mean: f64,
    /// Sample standard deviation (`0.0` when fewer than two values).
    pub std: f64,
}

impl Summary {
    /// Summarize a slice of values.
    #[must_use]
    pub fn of(values: &[f64]) -> Self {
        let mean = mean(values);
        Self {
            count: values.len(),
            mean,
            std: sample_std(values, mean),
        }
    }

    /// Standardized distance of `value` from the mean.
    ///
    /// Returns `0.0` when the standard deviation is zero.
    #[must_use]
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std <= 0.0 {
            return 0.0;
        }
        let direct = (value - self.mean) / self.std;
        if direct.is_finite() {
            return direct;
        }
        match finite_scale(&[value, self.mean, self.std]) {
            Some(scale) => (value / scale - self.mean / scale) / (self.std / scale),
            None => direct,
        }
    }

    /// Whether mean and standard deviation are both finite.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.mean.is_finite() && self.std.is_finite()
    }
}

/// Arithmetic mean, `0.0` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let direct = values.iter().sum::<f64>() / n;
    if direct.is_finite() {
        return direct;
    }
    match finite_scale(values) {
        Some(scale) => scale * (values.iter().map(|x| x / scale).sum::<f64>() / n),
        None => direct,
    }
}

/// Sample standard deviation around a precomputed mean.
///
/// `variance = Σ(x - mean)² / max(n - 1, 1)`.
#[must_use]
pub fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let denominator = (values.len() - 1) as f64;
    let sum_sq: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
    let direct = (sum_sq / denominator).sqrt();
    if direct.is_finite() || !mean.is_finite() {
        return direct;
    }
    let Some(scale) = finite_scale(values).map(|s| s.max(mean.abs())) else {
        return direct;
    };
    let scaled_sq: f64 = values
        .iter()
        .map(|x| (x / scale - mean / scale).powi(2))
        .sum();
    scale * (scaled_sq / denominator).sqrt()
}

/// Largest magnitude among `values`, when it is finite and non-zero.
///
/// Dividing by it keeps every value within `[-1, 1]`.
fn finite_scale(values: &[f64]) -> Option<f64> {
    let scale = values.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    (scale.is_finite() && scale > 0.0).then_some(scale)
}
