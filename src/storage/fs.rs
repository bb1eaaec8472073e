//! Filesystem artifact store.
//!
//! Each key maps to a file below the store root. Writes go to a sibling
//! temporary file which is flushed and then renamed over the target, so a
//! crash mid-write leaves either the old artifact or the new one.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;
use crate::traits::ArtifactStore;

/// Suffix of in-flight temporary files; never listed.
const TMP_SUFFIX: &str = ".tmp";

/// Artifact store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`.
    ///
    /// The directory is created lazily on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path, rejecting anything that escapes the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, String> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(format!("invalid artifact key '{key}'"));
        }
        Ok(self.root.join(relative))
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key).map_err(|message| StorageError::ReadFailed {
            key: key.to_string(),
            message,
        })?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key).map_err(|message| StorageError::WriteFailed {
            key: key.to_string(),
            message,
        })?;

        Self::write_atomic(&path, bytes)
            .await
            .map_err(|e| StorageError::WriteFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(key, bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let (dir_part, name_prefix) = prefix
            .rfind('/')
            .map_or(("", prefix), |idx| (&prefix[..=idx], &prefix[idx + 1..]));
        let dir = self.root.join(dir_part);

        let list_error = |e: std::io::Error| StorageError::ListFailed {
            prefix: prefix.to_string(),
            message: e.to_string(),
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(list_error(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            if !entry.file_type().await.map_err(list_error)?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
                continue;
            };
            if name.starts_with(name_prefix) && !name.ends_with(TMP_SUFFIX) {
                keys.push(format!("{dir_part}{name}"));
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_store() -> (FsArtifactStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        (FsArtifactStore::new(temp_dir.path()), temp_dir)
    }

    #[tokio::test]
    async fn test_read_missing_returns_none() {
        let (store, _dir) = create_store();
        assert!(store.read("residuals.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (store, _dir) = create_store();
        store.write("anomaly_report.json", b"{\"a\":1}").await.unwrap();

        let bytes = store.read("anomaly_report.json").await.unwrap().unwrap();
        assert_eq!(bytes, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_write_overwrites_and_leaves_no_temp_file() {
        let (store, dir) = create_store();
        store.write("metric_history.json", b"old").await.unwrap();
        store.write("metric_history.json", b"new").await.unwrap();

        let bytes = store.read("metric_history.json").await.unwrap().unwrap();
        assert_eq!(bytes, b"new");
        assert!(!dir.path().join("metric_history.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_creates_nested_directories() {
        let (store, dir) = create_store();
        store.write("baselines/a.json", b"{}").await.unwrap();
        assert!(dir.path().join("baselines").join("a.json").is_file());
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let (store, dir) = create_store();
        store.write("step-load-2024-02.json", b"[]").await.unwrap();
        store.write("step-load-2024-01.json", b"[]").await.unwrap();
        store.write("residuals.json", b"[]").await.unwrap();
        std::fs::write(dir.path().join("step-load-2024-03.json.tmp"), b"[").unwrap();

        let keys = store.list("step-load").await.unwrap();
        assert_eq!(keys, vec!["step-load-2024-01.json", "step-load-2024-02.json"]);
    }

    #[tokio::test]
    async fn test_list_subdirectory_prefix() {
        let (store, _dir) = create_store();
        store.write("baselines/b.json", b"{}").await.unwrap();
        store.write("baselines/a.json", b"{}").await.unwrap();

        let keys = store.list("baselines/").await.unwrap();
        assert_eq!(keys, vec!["baselines/a.json", "baselines/b.json"]);
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let store = FsArtifactStore::new("/nonexistent/perf-analytics-test");
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (store, _dir) = create_store();
        let result = store.write("../outside.json", b"{}").await;
        assert!(matches!(result, Err(StorageError::WriteFailed { .. })));

        let result = store.read("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::ReadFailed { .. })));
    }
}
