//! In-memory blob store.

use super::{content_md5, BlobMetadata, BlobStore};
use crate::core::BlobRef;
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Arc<Vec<u8>>,
    metadata: BlobMetadata,
}

/// Blob store backed by a map. Overwrites swap the whole entry under the lock.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<BlobRef, StoredBlob>>,
    writes: AtomicUsize,
}

impl InMemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upload calls served.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, blob: &BlobRef, data: Vec<u8>) -> Result<BlobMetadata> {
        let mut objects = self.objects.write();
        let generation = objects
            .get(blob)
            .map_or(1, |existing| existing.metadata.generation + 1);

        let metadata = BlobMetadata {
            blob: blob.clone(),
            size: data.len() as u64,
            md5_hash: content_md5(&data),
            generation,
            updated: Utc::now(),
        };
        objects.insert(
            blob.clone(),
            StoredBlob {
                data: Arc::new(data),
                metadata: metadata.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(metadata)
    }

    async fn download(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(blob)
            .map(|stored| stored.data.as_ref().clone())
            .ok_or_else(|| PipelineError::not_found(&blob.bucket, &blob.name))
    }

    async fn metadata(&self, blob: &BlobRef) -> Result<Option<BlobMetadata>> {
        Ok(self.objects.read().get(blob).map(|stored| stored.metadata.clone()))
    }

    async fn delete(&self, blob: &BlobRef) -> Result<bool> {
        Ok(self.objects.write().remove(blob).is_some())
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|key| key.bucket == bucket)
            .map(|key| key.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_download() {
        let store = InMemoryBlobStore::new();
        let blob = BlobRef::new("audio-out", "photo_en.mp3");

        let meta = store.upload(&blob, b"ID3audio".to_vec()).await.unwrap();
        assert_eq!(meta.size, 8);
        assert_eq!(meta.generation, 1);
        assert_eq!(meta.md5_hash, content_md5(b"ID3audio"));

        assert_eq!(store.download(&blob).await.unwrap(), b"ID3audio");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_and_bumps_generation() {
        let store = InMemoryBlobStore::new();
        let blob = BlobRef::new("b", "n");

        store.upload(&blob, b"first version".to_vec()).await.unwrap();
        let meta = store.upload(&blob, b"v2".to_vec()).await.unwrap();

        assert_eq!(meta.generation, 2);
        assert_eq!(store.download(&blob).await.unwrap(), b"v2");
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = InMemoryBlobStore::new();
        let blob = BlobRef::new("b", "missing");

        assert!(matches!(
            store.download(&blob).await,
            Err(PipelineError::NotFound { .. })
        ));
        assert!(store.metadata(&blob).await.unwrap().is_none());
        assert!(!store.delete(&blob).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_per_bucket_and_sorted() {
        let store = InMemoryBlobStore::new();
        store.upload(&BlobRef::new("a", "z.mp3"), vec![1]).await.unwrap();
        store.upload(&BlobRef::new("a", "b.mp3"), vec![1]).await.unwrap();
        store.upload(&BlobRef::new("other", "c.mp3"), vec![1]).await.unwrap();

        assert_eq!(store.list("a").await.unwrap(), vec!["b.mp3", "z.mp3"]);
    }
}
