//! Artifact storage backends.
//!
//! This module provides:
//! - [`FsArtifactStore`]: one file per artifact under a root directory
//! - [`MemoryArtifactStore`]: in-process map, for tests and embedding
//! - Artifact names and typed JSON load/save helpers
//!
//! # Architecture
//!
//! Stages never touch paths directly. They go through the
//! [`ArtifactStore`](crate::traits::ArtifactStore) trait using the keys in
//! [`artifacts`], so the backing store can change without touching the
//! computations.
//!
//! # Example
//!
//! ```ignore
//! use perf_analytics::storage::{artifacts, FsArtifactStore};
//!
//! let store = FsArtifactStore::new("./data/perf");
//! let history: Option<MetricHistory> = artifacts::load_json(&store, artifacts::HISTORY).await?;
//! ```

pub mod artifacts;
mod fs;
mod memory;

pub use self::fs::FsArtifactStore;
pub use artifacts::{load_json, save_json, Artifact};
pub use memory::MemoryArtifactStore;
