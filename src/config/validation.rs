//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::Config;
use crate::error::ConfigError;

/// Maximum allowed rolling-history capacity per metric.
pub const MAX_HISTORY_SAMPLES: usize = 100_000;

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `ANOMALY_STD_MULTIPLIER` must be finite and non-negative
/// - `ADAPTIVE_MIN_SAMPLES` must be at least 1
/// - `ROLLING_HISTORY_MAX` must be between 1 and 100000
/// - capacity cutoffs must be finite, non-negative and ordered
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if !config.std_multiplier.is_finite() || config.std_multiplier < 0.0 {
        return Err(invalid(
            "ANOMALY_STD_MULTIPLIER",
            "must be a finite, non-negative number",
        ));
    }

    if config.min_samples == 0 {
        return Err(invalid("ADAPTIVE_MIN_SAMPLES", "must be at least 1"));
    }

    if config.max_samples == 0 || config.max_samples > MAX_HISTORY_SAMPLES {
        return Err(ConfigError::InvalidValue {
            var: "ROLLING_HISTORY_MAX".into(),
            reason: format!("must be between 1 and {MAX_HISTORY_SAMPLES}"),
        });
    }

    for (var, value) in [
        ("CAPACITY_SCALE_RPS", config.scale_below_rps),
        ("CAPACITY_APPROACHING_RPS", config.approaching_below_rps),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(var, "must be a finite, non-negative number"));
        }
    }

    if config.scale_below_rps >= config.approaching_below_rps {
        return Err(invalid(
            "CAPACITY_SCALE_RPS",
            "must be lower than CAPACITY_APPROACHING_RPS",
        ));
    }

    Ok(())
}

fn invalid(var: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.into(),
        reason: reason.into(),
    }
}
