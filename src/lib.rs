//! Performance analytics pipeline
//!
//! Batch stages that turn forecast residuals and load-test results into
//! anomaly scores, adaptive thresholds, capacity estimates and exporter
//! gauges, plus perf-baseline recording and comparison.
//!
//! # Features
//!
//! - Rolling per-metric history with a bounded window
//! - Batch-relative anomaly scoring
//! - `mean ± K·std` adaptive thresholds with a readiness gate
//! - Capacity estimation from the stable prefix of a step-load run
//! - Owned gauge cache with explicit refresh
//! - Append-only perf baselines with per-scenario deltas
//!
//! # Quick Start
//!
//! ```bash
//! PERF_DATA_DIR=./data/perf ./perf-analytics run
//! ```
//!
//! # Architecture
//!
//! ```text
//! residuals.json ──▶ history-update ──▶ metric_history.json ──▶ threshold-update
//!        │                                                          │
//!        └────────▶ anomaly-score ──▶ anomaly_report.json           ▼
//!                                           │             adaptive_thresholds.json
//! step-load-*.json ─▶ capacity-estimate ─┐  │                       │
//!                                        ▼  ▼                       ▼
//!                                 capacity_estimate.json ──▶ publish (gauges)
//! ```
//!
//! Stages never call each other; they only share artifacts at rest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod anomaly;
pub mod baseline;
pub mod capacity;
pub mod cli;
pub mod config;
pub mod error;
pub mod gauge;
pub mod history;
pub mod pipeline;
pub mod stats;
pub mod storage;
pub mod threshold;
pub mod traits;
