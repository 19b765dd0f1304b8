//! Attachment file storage.
//!
//! Paths are storage-relative (`purchase_request/...`), produced by
//! [`epro_procurement::attachment::storage_path`]; a `FileStore` resolves them against its
//! own root.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::store::{StoreError, StoreResult};

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn write(&self, path: &str, bytes: &[u8]) -> StoreResult<()>;
    async fn read(&self, path: &str) -> StoreResult<Vec<u8>>;
    /// Deleting a file that does not exist succeeds.
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

/// Files under a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StoreError::Io(format!("invalid storage path '{path}'")));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, err: std::io::Error) -> StoreError {
    StoreError::Io(format!("{path}: {err}"))
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn write(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| io_error(path, e))?;
        debug!(path, size = bytes.len(), "file written");
        Ok(())
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target).await.map_err(|e| io_error(path, e))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

/// Files kept in memory, for tests and the in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryFileStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Io("lock poisoned".to_string())
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn write(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        self.files
            .write()
            .map_err(poisoned)?
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.files
            .read()
            .map_err(poisoned)?
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::Io(format!("{path}: not found")))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.files.write().map_err(poisoned)?.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("epro-files-{}", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn local_store_creates_parent_directories() {
        let root = temp_root();
        let store = LocalFileStore::new(&root);
        let path = "purchase_request/Kabul/pr_1/item_2/quote.pdf";

        store.write(path, b"quote").await.unwrap();
        assert_eq!(store.read(path).await.unwrap(), b"quote");
        assert!(root.join(path).exists());

        store.delete(path).await.unwrap();
        assert!(!root.join(path).exists());
        store.delete(path).await.unwrap();

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn local_store_rejects_paths_outside_root() {
        let store = LocalFileStore::new(temp_root());
        assert!(matches!(store.write("../escape.txt", b"x").await, Err(StoreError::Io(_))));
        assert!(matches!(store.write("/etc/passwd", b"x").await, Err(StoreError::Io(_))));
        assert!(matches!(store.read("").await, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn in_memory_store_round_trip() {
        let store = InMemoryFileStore::new();
        store.write("a/b.txt", b"hello").await.unwrap();
        assert!(store.contains("a/b.txt"));
        assert_eq!(store.read("a/b.txt").await.unwrap(), b"hello");
        store.delete("a/b.txt").await.unwrap();
        assert!(store.is_empty());
        assert!(store.read("a/b.txt").await.is_err());
    }
}
