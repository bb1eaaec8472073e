//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//!
//! # Example
//!
//! ```
//! use perf_analytics::config::{Config, DEFAULT_MAX_SAMPLES};
//!
//! // Use Config::from_env() in production
//! let config = Config::default();
//! assert_eq!(config.max_samples, DEFAULT_MAX_SAMPLES);
//! assert!((config.std_multiplier - 3.0).abs() < f64::EPSILON);
//! ```

mod validation;

pub use validation::{validate_config, MAX_HISTORY_SAMPLES};

use std::path::PathBuf;
use std::str::FromStr;

use crate::capacity::CapacityPolicy;
use crate::error::ConfigError;
use crate::threshold::ThresholdSettings;

/// Default artifact directory.
pub const DEFAULT_DATA_DIR: &str = "./data/perf";

/// Baseline subdirectory used when `PERF_BASELINE_DIR` is not set.
pub const DEFAULT_BASELINE_SUBDIR: &str = "baselines";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default standard-deviation multiplier (K).
pub const DEFAULT_STD_MULTIPLIER: f64 = 3.0;

/// Default sample count before a threshold is ready.
pub const DEFAULT_MIN_SAMPLES: usize = 20;

/// Default rolling-history capacity per metric.
pub const DEFAULT_MAX_SAMPLES: usize = 500;

/// Default rps below which scaling is recommended.
pub const DEFAULT_SCALE_BELOW_RPS: f64 = 50.0;

/// Default rps below which capacity is approaching its limit.
pub const DEFAULT_APPROACHING_BELOW_RPS: f64 = 100.0;

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                var: "LOG_FORMAT".into(),
                reason: format!("unknown format '{other}' (expected text or json)"),
            }),
        }
    }
}

/// Application configuration.
///
/// Every field has a default; use [`Config::from_env`] to apply overrides
/// from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root directory for pipeline artifacts.
    pub data_dir: PathBuf,
    /// Directory holding recorded perf baselines.
    pub baseline_dir: PathBuf,
    /// Standard-deviation multiplier for threshold bands.
    pub std_multiplier: f64,
    /// Samples required before a threshold is published as ready.
    pub min_samples: usize,
    /// Rolling-history capacity per metric.
    pub max_samples: usize,
    /// Capacity below which scaling is recommended.
    pub scale_below_rps: f64,
    /// Capacity below which the limit is considered close.
    pub approaching_below_rps: f64,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            baseline_dir: data_dir.join(DEFAULT_BASELINE_SUBDIR),
            data_dir,
            std_multiplier: DEFAULT_STD_MULTIPLIER,
            min_samples: DEFAULT_MIN_SAMPLES,
            max_samples: DEFAULT_MAX_SAMPLES,
            scale_below_rps: DEFAULT_SCALE_BELOW_RPS,
            approaching_below_rps: DEFAULT_APPROACHING_BELOW_RPS,
            log_level: DEFAULT_LOG_LEVEL.into(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables (with defaults):
    /// - `PERF_DATA_DIR`: Artifact directory (default: `./data/perf`)
    /// - `PERF_BASELINE_DIR`: Baseline directory (default: `<data dir>/baselines`)
    /// - `ANOMALY_STD_MULTIPLIER`: Threshold multiplier K (default: `3`)
    /// - `ADAPTIVE_MIN_SAMPLES`: Readiness gate (default: `20`)
    /// - `ROLLING_HISTORY_MAX`: History capacity per metric (default: `500`)
    /// - `CAPACITY_SCALE_RPS`: Scale-recommended cutoff (default: `50`)
    /// - `CAPACITY_APPROACHING_RPS`: Approaching cutoff (default: `100`)
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    /// - `LOG_FORMAT`: `text` or `json` (default: `text`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable does not parse or any value
    /// fails validation (see [`validate_config`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let data_dir = std::env::var("PERF_DATA_DIR")
            .map_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let baseline_dir = std::env::var("PERF_BASELINE_DIR").map_or_else(
            |_| data_dir.join(DEFAULT_BASELINE_SUBDIR),
            PathBuf::from,
        );

        let config = Self {
            data_dir,
            baseline_dir,
            std_multiplier: parse_env_f64("ANOMALY_STD_MULTIPLIER", DEFAULT_STD_MULTIPLIER)?,
            min_samples: parse_env_usize("ADAPTIVE_MIN_SAMPLES", DEFAULT_MIN_SAMPLES)?,
            max_samples: parse_env_usize("ROLLING_HISTORY_MAX", DEFAULT_MAX_SAMPLES)?,
            scale_below_rps: parse_env_f64("CAPACITY_SCALE_RPS", DEFAULT_SCALE_BELOW_RPS)?,
            approaching_below_rps: parse_env_f64(
                "CAPACITY_APPROACHING_RPS",
                DEFAULT_APPROACHING_BELOW_RPS,
            )?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into()),
            log_format: std::env::var("LOG_FORMAT")
                .map_or(Ok(LogFormat::Text), |v| v.parse())?,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Threshold parameters derived from this configuration.
    #[must_use]
    pub const fn threshold_settings(&self) -> ThresholdSettings {
        ThresholdSettings {
            std_multiplier: self.std_multiplier,
            min_samples: self.min_samples,
        }
    }

    /// Capacity classification cutoffs derived from this configuration.
    #[must_use]
    pub const fn capacity_policy(&self) -> CapacityPolicy {
        CapacityPolicy {
            scale_below_rps: self.scale_below_rps,
            approaching_below_rps: self.approaching_below_rps,
        }
    }
}

/// Parse an environment variable as f64, using a default if not set.
fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a number".into(),
        })
    })
}

/// Parse an environment variable as usize, using a default if not set.
fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}
