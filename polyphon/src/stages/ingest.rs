//! Putting photos into the input bucket.

use crate::core::{BlobRef, Event};
use crate::errors::{PipelineError, Result};
use crate::storage::BlobStore;
use std::path::Path;
use tracing::info;

/// Uploads a photo and returns the blob-write event that triggers labeling.
pub async fn ingest_photo(
    store: &dyn BlobStore,
    bucket: &str,
    name: &str,
    bytes: Vec<u8>,
) -> Result<Event> {
    let blob = BlobRef::new(bucket, name);
    let meta = store.upload(&blob, bytes).await?;
    info!(blob = %blob, size = meta.size, "Photo uploaded");
    Ok(Event::blob_written(bucket, name))
}

/// Reads a local file and ingests it under `name`.
pub async fn ingest_file(
    store: &dyn BlobStore,
    bucket: &str,
    name: &str,
    path: impl AsRef<Path>,
) -> Result<Event> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipelineError::permanent("ingest", format!("{} does not exist", path.display()))
        } else {
            e.into()
        }
    })?;
    ingest_photo(store, bucket, name, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBlobStore;

    #[tokio::test]
    async fn test_ingest_photo_returns_trigger() {
        let store = InMemoryBlobStore::new();
        let event = ingest_photo(&store, "photos-in", "in_photo.jpg", vec![0xFF, 0xD8])
            .await
            .unwrap();

        assert_eq!(event, Event::blob_written("photos-in", "in_photo.jpg"));
        assert_eq!(
            store.download(&BlobRef::new("photos-in", "in_photo.jpg")).await.unwrap(),
            vec![0xFF, 0xD8]
        );
    }

    #[tokio::test]
    async fn test_ingest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        let store = InMemoryBlobStore::new();

        ingest_file(&store, "photos-in", "in_photo.jpg", &path).await.unwrap();
        assert_eq!(store.len(), 1);

        let missing = ingest_file(&store, "photos-in", "x.jpg", dir.path().join("nope.jpg")).await;
        assert!(matches!(missing, Err(PipelineError::Permanent { .. })));
    }
}
