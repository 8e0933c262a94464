//! A JSON document kept in memory or in a [`SnapshotFile`].

use super::snapshot_file::SnapshotFile;
use hourboost_core::error::{HourboostError, Result};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

/// Backing of a repository document.
///
/// Reads hand out values computed from the document, never references into
/// it, so callers always work on snapshots.
pub enum DocumentStore<D> {
    Memory(RwLock<D>),
    File(SnapshotFile<D>),
}

impl<D> DocumentStore<D>
where
    D: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    pub fn memory(initial: D) -> Self {
        DocumentStore::Memory(RwLock::new(initial))
    }

    pub fn file(file: SnapshotFile<D>) -> Self {
        DocumentStore::File(file)
    }

    pub async fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&D) -> R + Send + 'static,
        R: Send + 'static,
    {
        match self {
            DocumentStore::Memory(doc) => Ok(f(&*doc.read().await)),
            DocumentStore::File(file) => {
                let file = file.clone();
                blocking(move || {
                    let doc = file.load()?.unwrap_or_default();
                    Ok(f(&doc))
                })
                .await
            }
        }
    }

    pub async fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut D) -> R + Send + 'static,
        R: Send + 'static,
    {
        match self {
            DocumentStore::Memory(doc) => Ok(f(&mut *doc.write().await)),
            DocumentStore::File(file) => {
                let file = file.clone();
                blocking(move || Ok(file.update(f)?)).await
            }
        }
    }
}

async fn blocking<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HourboostError::internal(format!("Storage task failed: {}", e)))?
}
