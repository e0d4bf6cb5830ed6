//! Storage for uploaded CSV files.
//!
//! A batch's file is copied into the store when attached and read back by the
//! worker on start, resume and retry. It stays until the batch reaches a
//! terminal state or is deleted.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::IngestError;

/// Path-addressable store for uploaded batch files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Copies `source` into the store for `batch_id`, returning the stored path.
    async fn put(&self, batch_id: Uuid, source: &Path) -> Result<String, IngestError>;

    /// Opens a stored file for sequential reading.
    ///
    /// Returns [`IngestError::FileMissing`] when nothing is stored at `path`.
    async fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, IngestError>;

    async fn exists(&self, path: &str) -> Result<bool, IngestError>;

    /// Removes a stored file. Removing a missing file is not an error.
    async fn remove(&self, path: &str) -> Result<(), IngestError>;
}

/// [`FileStore`] backed by a local directory, one `<batch_id>.csv` per batch.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, batch_id: Uuid) -> PathBuf {
        self.root.join(format!("{batch_id}.csv"))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, batch_id: Uuid, source: &Path) -> Result<String, IngestError> {
        if !tokio::fs::try_exists(source).await? {
            return Err(IngestError::FileMissing {
                path: source.display().to_string(),
            });
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.path_for(batch_id);
        tokio::fs::copy(source, &target).await?;

        tracing::debug!(
            batch_id = %batch_id,
            path = %target.display(),
            "Stored batch file"
        );

        Ok(target.display().to_string())
    }

    async fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, IngestError> {
        match tokio::fs::File::open(path).await {
            Ok(file) => Ok(Box::new(file.into_std().await)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(IngestError::FileMissing {
                    path: path.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, IngestError> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn remove(&self, path: &str) -> Result<(), IngestError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_open_remove() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("upload.csv");
        std::fs::write(&source, "product_name\nLamp\n").unwrap();

        let store = LocalFileStore::new(dir.path().join("store"));
        let batch_id = Uuid::new_v4();
        let stored = store.put(batch_id, &source).await.unwrap();

        assert!(stored.ends_with(&format!("{batch_id}.csv")));
        assert!(store.exists(&stored).await.unwrap());

        let mut contents = String::new();
        store
            .open(&stored)
            .await
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "product_name\nLamp\n");

        store.remove(&stored).await.unwrap();
        assert!(!store.exists(&stored).await.unwrap());
        // second removal is a no-op
        store.remove(&stored).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path());
        let missing = dir.path().join("gone.csv").display().to_string();

        let err = store.open(&missing).await.err().unwrap();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_put_missing_source() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path());

        let err = store
            .put(Uuid::new_v4(), &dir.path().join("nope.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FileMissing { .. }));
    }
}
