//! In-memory artifact store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::traits::ArtifactStore;

/// Artifact store backed by an ordered in-process map.
///
/// Writes replace the whole value under the lock, so readers never see a
/// partial artifact.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.read().map_or(0, |a| a.len())
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let artifacts = self.artifacts.read().map_err(|e| StorageError::ReadFailed {
            key: key.to_string(),
            message: format!("lock poisoned: {e}"),
        })?;
        Ok(artifacts.get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|e| StorageError::WriteFailed {
                key: key.to_string(),
                message: format!("lock poisoned: {e}"),
            })?;
        artifacts.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let artifacts = self.artifacts.read().map_err(|e| StorageError::ListFailed {
            prefix: prefix.to_string(),
            message: format!("lock poisoned: {e}"),
        })?;
        Ok(artifacts
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
