//! Blob store abstraction.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Key-value object store addressed by bucket and key.
///
/// The worker receives one explicitly constructed implementation at
/// startup; tests substitute an in-memory one.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download `bucket/key` into the local file `dest`.
    async fn fetch(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<()>;

    /// Upload the local file `src` to `bucket/key`.
    async fn store(&self, bucket: &str, key: &str, src: &Path, content_type: &str) -> StorageResult<()>;

    /// Create `bucket` if it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()>;
}
