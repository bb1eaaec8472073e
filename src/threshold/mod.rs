//! Adaptive per-metric thresholds.
//!
//! Each metric's band is `mean ± K·std` over its rolling window. A band is
//! only published once the window holds `min_samples` values; until then the
//! metric is reported with its count but is not actionable. The band narrows
//! or widens as the window fills with steadier or noisier history.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_MIN_SAMPLES, DEFAULT_STD_MULTIPLIER};
use crate::history::MetricHistory;
use crate::stats::Summary;

/// Run-time threshold parameters, shared by all metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSettings {
    /// Band half-width in standard deviations (K).
    pub std_multiplier: f64,
    /// Samples required before a band is published.
    pub min_samples: usize,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            std_multiplier: DEFAULT_STD_MULTIPLIER,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

/// Threshold state for one metric.
///
/// When `ready` is false only `count` is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdRecord {
    /// Metric name.
    pub metric: String,
    /// Whether enough history exists to publish a band.
    pub ready: bool,
    /// Samples in the window.
    pub count: usize,
    /// Window mean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    /// Window sample standard deviation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    /// `mean + K·std`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    /// `mean - K·std`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
}

/// Position of a value relative to a threshold band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breach {
    /// The band is not ready yet.
    NotReady,
    /// Within `[lower, upper]`.
    Within,
    /// Above `upper`.
    Above,
    /// Below `lower`.
    Below,
}

impl Breach {
    /// Gauge encoding: `-1` below, `0` within, `1` above; `None` when not ready.
    #[must_use]
    pub const fn gauge_value(self) -> Option<f64> {
        match self {
            Self::NotReady => None,
            Self::Within => Some(0.0),
            Self::Above => Some(1.0),
            Self::Below => Some(-1.0),
        }
    }
}

impl ThresholdRecord {
    /// Compute the record for one metric's window.
    #[must_use]
    pub fn from_values(metric: &str, values: &[f64], settings: &ThresholdSettings) -> Self {
        if values.len() < settings.min_samples {
            return Self {
                metric: metric.to_string(),
                ready: false,
                count: values.len(),
                mean: None,
                std: None,
                upper: None,
                lower: None,
            };
        }

        let summary = Summary::of(values);
        let half_width = settings.std_multiplier * summary.std;
        Self {
            metric: metric.to_string(),
            ready: true,
            count: summary.count,
            mean: Some(summary.mean),
            std: Some(summary.std),
            upper: Some(summary.mean + half_width),
            lower: Some(summary.mean - half_width),
        }
    }

    /// Whether every populated statistic is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        [self.mean, self.std, self.upper, self.lower]
            .into_iter()
            .flatten()
            .all(f64::is_finite)
    }

    /// Classify a value against this band. Bounds are inclusive.
    #[must_use]
    pub fn classify(&self, value: f64) -> Breach {
        match (self.ready, self.lower, self.upper) {
            (true, Some(lower), Some(upper)) => {
                if value > upper {
                    Breach::Above
                } else if value < lower {
                    Breach::Below
                } else {
                    Breach::Within
                }
            }
            _ => Breach::NotReady,
        }
    }
}

/// Thresholds for every metric in the history, in metric-name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdReport {
    /// K used for the bands.
    pub std_multiplier: f64,
    /// Readiness gate used.
    pub min_samples: usize,
    /// Per-metric records.
    pub records: Vec<ThresholdRecord>,
}

impl ThresholdReport {
    /// Record for a metric, if present.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<&ThresholdRecord> {
        self.records.iter().find(|r| r.metric == metric)
    }

    /// Number of metrics with a published band.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.records.iter().filter(|r| r.ready).count()
    }
}

/// Recompute thresholds for the whole history.
#[must_use]
pub fn compute_thresholds(history: &MetricHistory, settings: &ThresholdSettings) -> ThresholdReport {
    let records = history
        .iter()
        .map(|(metric, window)| {
            let values: Vec<f64> = window.iter().map(|s| s.value).collect();
            ThresholdRecord::from_values(metric, &values, settings)
        })
        .collect();

    ThresholdReport {
        std_multiplier: settings.std_multiplier,
        min_samples: settings.min_samples,
        records,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
mod tests {
    use super::*;
    use crate::history::MetricSample;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn history_with(metric: &str, values: &[f64]) -> MetricHistory {
        let mut history = MetricHistory::default();
        for (i, v) in values.iter().enumerate() {
            history.append(metric, MetricSample::new(i as i64, *v), 1_000);
        }
        history
    }

    #[test]
    fn test_not_ready_below_min_samples() {
        let settings = ThresholdSettings {
            std_multiplier: 3.0,
            min_samples: 5,
        };
        let record = ThresholdRecord::from_values("m", &[1.0, 2.0, 3.0, 4.0], &settings);

        assert_eq!(
            record,
            ThresholdRecord {
                metric: "m".into(),
                ready: false,
                count: 4,
                mean: None,
                std: None,
                upper: None,
                lower: None,
            }
        );
        assert_eq!(record.classify(100.0), Breach::NotReady);
    }

    #[test]
    fn test_not_ready_serializes_count_only() {
        let record = ThresholdRecord::from_values("m", &[1.0], &ThresholdSettings::default());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"metric": "m", "ready": false, "count": 1})
        );
    }

    #[test]
    fn test_ready_at_exactly_min_samples() {
        let settings = ThresholdSettings {
            std_multiplier: 2.0,
            min_samples: 3,
        };
        let record = ThresholdRecord::from_values("m", &[1.0, 3.0, 5.0], &settings);

        assert!(record.ready);
        assert_eq!(record.count, 3);
        assert_eq!(record.mean, Some(3.0));
        assert_eq!(record.std, Some(2.0));
        assert_eq!(record.upper, Some(7.0));
        assert_eq!(record.lower, Some(-1.0));
    }

    #[test]
    fn test_zero_variance_band_collapses() {
        let settings = ThresholdSettings {
            std_multiplier: 3.0,
            min_samples: 2,
        };
        let record = ThresholdRecord::from_values("flat", &[4.0; 25], &settings);
        assert_eq!(record.upper, Some(4.0));
        assert_eq!(record.lower, Some(4.0));
        assert_eq!(record.classify(4.0), Breach::Within);
        assert_eq!(record.classify(4.1), Breach::Above);
    }

    #[test]
    fn test_single_sample_ready_with_min_one() {
        let settings = ThresholdSettings {
            std_multiplier: 3.0,
            min_samples: 1,
        };
        let record = ThresholdRecord::from_values("m", &[9.0], &settings);
        assert!(record.ready);
        assert_eq!(record.std, Some(0.0));
    }

    #[test]
    fn test_band_overflow_is_not_finite() {
        let settings = ThresholdSettings {
            std_multiplier: 3.0,
            min_samples: 2,
        };
        let record = ThresholdRecord::from_values("m", &[1e308, -1e308], &settings);
        assert!(record.ready);
        assert!(record.std.unwrap().is_finite());
        assert!(!record.is_finite());

        let narrow = ThresholdSettings {
            std_multiplier: 1.0,
            min_samples: 2,
        };
        assert!(ThresholdRecord::from_values("m", &[1e308, -1e308], &narrow).is_finite());
        assert!(ThresholdRecord::from_values("m", &[1.0], &narrow).is_finite());
    }

    #[test]
    fn test_classify() {
        let settings = ThresholdSettings {
            std_multiplier: 1.0,
            min_samples: 3,
        };
        let record = ThresholdRecord::from_values("m", &[1.0, 3.0, 5.0], &settings);
        assert_eq!(record.classify(5.0), Breach::Within);
        assert_eq!(record.classify(1.0), Breach::Within);
        assert_eq!(record.classify(5.5), Breach::Above);
        assert_eq!(record.classify(0.5), Breach::Below);
        assert_eq!(Breach::Below.gauge_value(), Some(-1.0));
        assert_eq!(Breach::NotReady.gauge_value(), None);
    }

    #[test]
    fn test_compute_thresholds_covers_all_metrics() {
        let mut history = history_with("b", &[1.0, 2.0, 3.0]);
        history.append("a", MetricSample::new(0, 5.0), 10);
        let settings = ThresholdSettings {
            std_multiplier: 3.0,
            min_samples: 3,
        };

        let report = compute_thresholds(&history, &settings);

        let metrics: Vec<&str> = report.records.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, vec!["a", "b"]);
        assert!(!report.get("a").unwrap().ready);
        assert!(report.get("b").unwrap().ready);
        assert_eq!(report.ready_count(), 1);
        assert_eq!(report.min_samples, 3);
    }

    #[test]
    fn test_empty_history() {
        let report = compute_thresholds(&MetricHistory::default(), &ThresholdSettings::default());
        assert!(report.records.is_empty());
        assert_eq!(report.std_multiplier, 3.0);
        assert_eq!(report.min_samples, 20);
    }

    proptest! {
        #[test]
        fn prop_readiness_gate_and_band_width(
            values in proptest::collection::vec(-1.0e3f64..1.0e3, 0..60),
            min_samples in 1usize..40,
            k in 0.0f64..6.0,
        ) {
            let settings = ThresholdSettings { std_multiplier: k, min_samples };
            let report = compute_thresholds(&history_with("m", &values), &settings);

            if values.is_empty() {
                prop_assert!(report.records.is_empty());
            } else {
                let record = report.get("m").unwrap();
                prop_assert_eq!(record.count, values.len());
                if values.len() < min_samples {
                    prop_assert!(!record.ready);
                    prop_assert!(record.upper.is_none() && record.lower.is_none());
                } else {
                    prop_assert!(record.ready);
                    let width = record.upper.unwrap() - record.lower.unwrap();
                    let expected = 2.0 * k * record.std.unwrap();
                    prop_assert!((width - expected).abs() <= 1e-9 * expected.abs().max(1.0));
                }
            }
        }
    }
}
