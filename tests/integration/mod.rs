//! Integration tests for the performance analytics pipeline.
//!
//! Every test runs stages against a real filesystem store in a temporary
//! directory, the way a scheduler would invoke them.

mod baseline_flow;
mod capacity_flow;
mod error_recovery;
mod metrics_flow;

use std::path::Path;

use chrono::DateTime;
use perf_analytics::config::Config;
use perf_analytics::pipeline::Pipeline;
use perf_analytics::storage::FsArtifactStore;
use perf_analytics::traits::FixedTimeProvider;
use tempfile::TempDir;

/// Pipeline over `<tmp>/perf` and `<tmp>/perf/baselines` with a fixed clock.
pub fn test_pipeline(
    dir: &TempDir,
    millis: i64,
    config: Config,
) -> Pipeline<FsArtifactStore, FixedTimeProvider> {
    let data_dir = dir.path().join("perf");
    let baseline_dir = data_dir.join("baselines");
    let config = Config {
        data_dir: data_dir.clone(),
        baseline_dir: baseline_dir.clone(),
        ..config
    };
    Pipeline::new(
        FsArtifactStore::new(data_dir),
        FsArtifactStore::new(baseline_dir),
        FixedTimeProvider(DateTime::from_timestamp_millis(millis).expect("valid timestamp")),
        config,
    )
}

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().expect("has parent")).expect("create dir");
    std::fs::write(path, contents).expect("write file");
}

/// Read a file as JSON.
pub fn read_json(path: &Path) -> serde_json::Value {
    let bytes = std::fs::read(path).expect("read file");
    serde_json::from_slice(&bytes).expect("valid JSON")
}
