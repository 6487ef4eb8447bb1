//! Object storage contract and local implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{StoreError, StoreResult};

/// Container-scoped byte storage consumed by the export and import pipelines.
///
/// Keys are flat names within a container; `list` returns them sorted so the
/// import pipeline replays exported pages in sequence order.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the container if it does not already exist.
    async fn ensure_container(&self, container: &str) -> StoreResult<()>;

    /// Writes an object, replacing any existing value.
    async fn write(&self, container: &str, key: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Reads an object. Returns `StoreError::NotFound` if absent.
    async fn read(&self, container: &str, key: &str) -> StoreResult<Vec<u8>>;

    /// Lists keys in a container, optionally restricted to a prefix, sorted.
    async fn list(&self, container: &str, prefix: Option<&str>) -> StoreResult<Vec<String>>;

    /// Returns whether an object exists.
    async fn exists(&self, container: &str, key: &str) -> StoreResult<bool>;

    /// Backend name for logging and diagnostics.
    fn backend_type(&self) -> &'static str;
}

/// Filesystem-backed object store: one directory per container.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_path(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    fn object_path(&self, container: &str, key: &str) -> StoreResult<PathBuf> {
        // Keys are flat names; reject anything that could escape the container.
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(StoreError::Config(format!("Invalid object key: '{key}'")));
        }
        Ok(self.container_path(container).join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn ensure_container(&self, container: &str) -> StoreResult<()> {
        tokio::fs::create_dir_all(self.container_path(container)).await?;
        Ok(())
    }

    async fn write(&self, container: &str, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.object_path(container, key)?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(container, key, size = bytes.len(), "Object written");
        Ok(())
    }

    async fn read(&self, container: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.object_path(container, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("{container}/{key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, container: &str, prefix: Option<&str>) -> StoreResult<Vec<String>> {
        let path = self.container_path(container);
        if !Path::new(&path).exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if prefix.is_none_or(|p| name.starts_with(p)) {
                    keys.push(name);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, container: &str, key: &str) -> StoreResult<bool> {
        let path = self.object_path(container, key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn backend_type(&self) -> &'static str {
        "fs"
    }
}

/// In-memory object store for tests and local dry runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    containers: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_container(&self, container: &str) -> StoreResult<()> {
        let mut containers = self.containers.write().await;
        containers.entry(container.to_string()).or_default();
        Ok(())
    }

    async fn write(&self, container: &str, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let mut containers = self.containers.write().await;
        containers
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, container: &str, key: &str) -> StoreResult<Vec<u8>> {
        let containers = self.containers.read().await;
        containers
            .get(container)
            .and_then(|c| c.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{container}/{key}")))
    }

    async fn list(&self, container: &str, prefix: Option<&str>) -> StoreResult<Vec<String>> {
        let containers = self.containers.read().await;
        let mut keys: Vec<String> = containers
            .get(container)
            .map(|c| {
                c.keys()
                    .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, container: &str, key: &str) -> StoreResult<bool> {
        let containers = self.containers.read().await;
        Ok(containers
            .get(container)
            .is_some_and(|c| c.contains_key(key)))
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_write_read_roundtrip() {
        let store = MemoryObjectStore::new();
        store.ensure_container("exports").await.unwrap();
        store.write("exports", "users_000000.json", b"[]").await.unwrap();

        let bytes = store.read("exports", "users_000000.json").await.unwrap();
        assert_eq!(bytes, b"[]");
    }

    #[tokio::test]
    async fn test_memory_read_missing_is_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.read("exports", "nope.json").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_list_sorted_with_prefix() {
        let store = MemoryObjectStore::new();
        store.write("c", "users_000001.json", b"b").await.unwrap();
        store.write("c", "users_000000.json", b"a").await.unwrap();
        store.write("c", "audit_000000.json", b"x").await.unwrap();

        let keys = store.list("c", Some("users_")).await.unwrap();
        assert_eq!(keys, vec!["users_000000.json", "users_000001.json"]);
    }

    #[tokio::test]
    async fn test_memory_exists() {
        let store = MemoryObjectStore::new();
        assert!(!store.exists("c", "k").await.unwrap());
        store.write("c", "k", b"v").await.unwrap();
        assert!(store.exists("c", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_write_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store.ensure_container("exports").await.unwrap();
        store.write("exports", "users_000000.json", b"[1]").await.unwrap();
        store.write("exports", "users_000001.json", b"[2]").await.unwrap();

        assert!(store.exists("exports", "users_000000.json").await.unwrap());
        let keys = store.list("exports", Some("users_")).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], "users_000000.json");

        let bytes = store.read("exports", "users_000001.json").await.unwrap();
        assert_eq!(bytes, b"[2]");
    }

    #[tokio::test]
    async fn test_fs_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_container("c").await.unwrap();

        let err = store.write("c", "../escape.json", b"x").await.unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_fs_list_missing_container_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.list("absent", None).await.unwrap().is_empty());
    }
}
