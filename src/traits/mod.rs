//! Trait definitions for mockable dependencies.
//!
//! This module defines traits for:
//! - [`ArtifactStore`]: Raw artifact persistence (filesystem, memory, ...)
//! - [`TimeProvider`]: Time abstraction for testing
//!
//! # Mocking
//!
//! All traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.
//!
//! # Example
//!
//! ```
//! use perf_analytics::traits::{TimeProvider, RealTimeProvider};
//!
//! let time_provider = RealTimeProvider;
//! let now = time_provider.now();
//! println!("Current time: {now}");
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;

/// Artifact persistence trait.
///
/// Stages hand data to each other exclusively through artifacts at rest.
/// Keys are `/`-separated relative names such as `anomaly_report.json` or
/// `baselines/2024-01-01T00-00-00-000Z-health.check.json`. Implementations
/// decide where those keys live.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Read an artifact's bytes.
    ///
    /// Returns `None` if the artifact does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the artifact exists but
    /// cannot be read.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace an artifact's contents.
    ///
    /// Readers must never observe a partially-written artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteFailed`] if the artifact cannot be persisted.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// List artifact keys starting with `prefix`, sorted lexicographically.
    ///
    /// A prefix that matches nothing yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ListFailed`] if enumeration fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Time provider trait for deterministic testing.
///
/// This trait abstracts time operations to allow for
/// deterministic testing by providing fixed timestamps.
#[cfg_attr(test, mockall::automock)]
pub trait TimeProvider: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real time provider using system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time provider that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeProvider(pub DateTime<Utc>);

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
