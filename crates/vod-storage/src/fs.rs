//! Filesystem object store backend for development and tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectInfo, ObjectStore};

/// Object store backed by a local directory.
///
/// Keys map directly to relative paths under the root. Content types are
/// accepted and ignored; the filesystem has no use for them.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        // Reject traversal outside the root.
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|c| c == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    /// Recursively collect files under a directory.
    async fn collect(&self, dir: PathBuf, out: &mut Vec<ObjectInfo>) -> StorageResult<()> {
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(path);
                } else if let Some(key) = self.key_for(&path) {
                    out.push(ObjectInfo {
                        key,
                        size: meta.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put_bytes(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        debug!("Wrote {}", key);
        Ok(())
    }

    async fn put_file(&self, key: &str, src: &Path, _content_type: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(src, &path).await?;
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_file(&self, key: &str, dst: &Path) -> StorageResult<()> {
        let path = self.resolve(key)?;
        if !fs::try_exists(&path).await? {
            return Err(StorageError::not_found(key));
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&path, dst).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u32> {
        let objects = self.list(prefix).await?;
        for obj in &objects {
            self.delete(&obj.key).await?;
        }
        Ok(objects.len() as u32)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut out = Vec::new();
        // A prefix may name a directory or a partial filename; walk the
        // deepest existing directory and filter by the full prefix.
        let base = match prefix.rfind('/') {
            Some(idx) => self.root.join(&prefix[..idx]),
            None => self.root.clone(),
        };
        self.collect(base, &mut out).await?;
        out.retain(|o| o.key.starts_with(prefix));
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = FsStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = store();
        store
            .put_bytes("videos/a/chunks/chunk_0", b"hello".to_vec(), "video/mp4")
            .await
            .unwrap();
        let data = store.get_bytes("videos/a/chunks/chunk_0").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.get_bytes("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        store
            .put_bytes("videos/a/raw.mp4", vec![1, 2, 3], "video/mp4")
            .await
            .unwrap();
        store.delete("videos/a/raw.mp4").await.unwrap();
        store.delete("videos/a/raw.mp4").await.unwrap();
        assert!(!store.exists("videos/a/raw.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_and_delete_prefix() {
        let (_dir, store) = store();
        for i in 0..3 {
            store
                .put_bytes(
                    &format!("videos/a/chunks/chunk_{i}"),
                    vec![i],
                    "application/octet-stream",
                )
                .await
                .unwrap();
        }
        store
            .put_bytes("videos/a/raw.mp4", vec![9], "video/mp4")
            .await
            .unwrap();

        let chunks = store.list("videos/a/chunks/").await.unwrap();
        assert_eq!(chunks.len(), 3);

        let removed = store.delete_prefix("videos/a/chunks/").await.unwrap();
        assert_eq!(removed, 3);
        assert!(store.list("videos/a/chunks/").await.unwrap().is_empty());
        assert!(store.exists("videos/a/raw.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (_dir, store) = store();
        assert!(store.get_bytes("../escape").await.is_err());
        assert!(store.get_bytes("/absolute").await.is_err());
    }
}
