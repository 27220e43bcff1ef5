//! Blob storage keyed by `(bucket, name)`.
//!
//! Large payloads (images, audio) are passed between stages by reference.
//! Writes replace whole objects atomically: a reader sees either the old
//! content or the new content, never a partial write.

mod fs;
mod memory;

pub use fs::FileBlobStore;
pub use memory::InMemoryBlobStore;

use crate::core::BlobRef;
use crate::errors::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Trait for object stores.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Uploads an object, replacing any existing object with the same name.
    async fn upload(&self, blob: &BlobRef, data: Vec<u8>) -> Result<BlobMetadata>;

    /// Downloads an object.
    ///
    /// Fails with `PipelineError::NotFound` if it does not exist.
    async fn download(&self, blob: &BlobRef) -> Result<Vec<u8>>;

    /// Returns object metadata, or `None` if it does not exist.
    async fn metadata(&self, blob: &BlobRef) -> Result<Option<BlobMetadata>>;

    /// Deletes an object. Returns true if something was deleted.
    async fn delete(&self, blob: &BlobRef) -> Result<bool>;

    /// Lists object names in a bucket, sorted.
    async fn list(&self, bucket: &str) -> Result<Vec<String>>;
}

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// The object.
    pub blob: BlobRef,
    /// Size in bytes.
    pub size: u64,
    /// Base64 MD5 of the content.
    pub md5_hash: String,
    /// Incremented on every overwrite, starting at 1.
    pub generation: u64,
    /// Last write time.
    pub updated: DateTime<Utc>,
}

/// Base64 MD5 digest of object content.
#[must_use]
pub fn content_md5(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_md5_known_value() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }
}
