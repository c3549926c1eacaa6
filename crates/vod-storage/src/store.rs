//! The object store capability trait.

use async_trait::async_trait;
use std::path::Path;

use crate::error::StorageResult;

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

/// Bucket-scoped object storage.
///
/// Workers only depend on this trait so the pipeline can run against an
/// S3-compatible bucket in production and a filesystem root in tests.
/// Deletes are idempotent: removing a missing object is a no-op.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, overwriting any previous content.
    async fn put_bytes(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Upload a local file as an object.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()>;

    /// Read an object into memory.
    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Download an object to a local file, creating parent directories.
    async fn get_file(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Delete an object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete every object under a prefix, returning the number removed.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u32>;

    /// List objects under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}
