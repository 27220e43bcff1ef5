//! Filesystem blob store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<bucket>/<name>                 object content
//! <root>/.meta/<bucket>/<name>.json      object metadata
//! ```

use super::{content_md5, BlobMetadata, BlobStore};
use crate::core::BlobRef;
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const META_DIR: &str = ".meta";
const TMP_PREFIX: &str = ".tmp-";

/// Blob store rooted at a local directory.
///
/// Uploads go to a temporary file in the target directory and are renamed
/// into place, so readers never observe a half-written object.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, blob: &BlobRef) -> Result<PathBuf> {
        Ok(self
            .root
            .join(checked_segment(&blob.bucket)?)
            .join(checked_relative(&blob.name)?))
    }

    fn meta_path(&self, blob: &BlobRef) -> Result<PathBuf> {
        let mut path = self
            .root
            .join(META_DIR)
            .join(checked_segment(&blob.bucket)?)
            .join(checked_relative(&blob.name)?);
        let file_name = format!(
            "{}.json",
            path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        );
        path.set_file_name(file_name);
        Ok(path)
    }

    async fn read_metadata(&self, blob: &BlobRef) -> Result<Option<BlobMetadata>> {
        match fs::read(self.meta_path(blob)?).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `data` next to `path` and renames it over `path`.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::permanent("storage", "object path has no parent"))?;
    fs::create_dir_all(parent).await?;

    let tmp = parent.join(format!("{TMP_PREFIX}{}", Uuid::new_v4()));
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn checked_segment(segment: &str) -> Result<&str> {
    if segment.is_empty() || segment.contains('/') || segment.starts_with('.') {
        return Err(PipelineError::permanent(
            "storage",
            format!("invalid bucket name '{segment}'"),
        ));
    }
    Ok(segment)
}

fn checked_relative(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(part) if !part.to_string_lossy().starts_with(TMP_PREFIX)));
    if valid {
        Ok(path)
    } else {
        Err(PipelineError::permanent(
            "storage",
            format!("invalid object name '{name}'"),
        ))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn upload(&self, blob: &BlobRef, data: Vec<u8>) -> Result<BlobMetadata> {
        let path = self.object_path(blob)?;
        let generation = self
            .read_metadata(blob)
            .await?
            .map_or(1, |existing| existing.generation + 1);

        let metadata = BlobMetadata {
            blob: blob.clone(),
            size: data.len() as u64,
            md5_hash: content_md5(&data),
            generation,
            updated: Utc::now(),
        };

        write_atomically(&path, &data).await?;
        write_atomically(&self.meta_path(blob)?, &serde_json::to_vec(&metadata)?).await?;
        debug!(blob = %blob, size = metadata.size, generation, "Blob written");

        Ok(metadata)
    }

    async fn download(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        match fs::read(self.object_path(blob)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PipelineError::not_found(&blob.bucket, &blob.name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn metadata(&self, blob: &BlobRef) -> Result<Option<BlobMetadata>> {
        if fs::metadata(self.object_path(blob)?).await.is_err() {
            return Ok(None);
        }
        self.read_metadata(blob).await
    }

    async fn delete(&self, blob: &BlobRef) -> Result<bool> {
        let removed = match fs::remove_file(self.object_path(blob)?).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let _ = fs::remove_file(self.meta_path(blob)?).await;
        Ok(removed)
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let bucket_dir = self.root.join(checked_segment(bucket)?);
        let mut names = Vec::new();
        let mut pending = vec![bucket_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&bucket_dir) {
                    names.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());
        let blob = BlobRef::new("audio-out", "photo_fr.mp3");

        let meta = store.upload(&blob, b"ID3-fr".to_vec()).await.unwrap();

        assert!(dir.path().join("audio-out/photo_fr.mp3").exists());
        assert_eq!(store.download(&blob).await.unwrap(), b"ID3-fr");
        assert_eq!(store.metadata(&blob).await.unwrap(), Some(meta));
    }

    #[tokio::test]
    async fn test_overwrite_is_complete_and_hash_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());
        let blob = BlobRef::new("audio-out", "photo_en.mp3");

        store.upload(&blob, vec![7u8; 4096]).await.unwrap();
        let meta = store.upload(&blob, b"short".to_vec()).await.unwrap();

        let content = store.download(&blob).await.unwrap();
        assert_eq!(content, b"short");
        assert_eq!(meta.generation, 2);
        assert_eq!(meta.md5_hash, content_md5(&content));
        assert_eq!(store.list("audio-out").await.unwrap(), vec!["photo_en.mp3"]);
    }

    #[tokio::test]
    async fn test_nested_names_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        store.upload(&BlobRef::new("b", "2024/a.jpg"), vec![1]).await.unwrap();
        store.upload(&BlobRef::new("b", "top.jpg"), vec![2]).await.unwrap();

        assert_eq!(store.list("b").await.unwrap(), vec!["2024/a.jpg", "top.jpg"]);
        assert!(store.list("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        let err = store
            .upload(&BlobRef::new("b", "../outside"), vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Permanent { .. }));
        assert!(store.upload(&BlobRef::new(".meta", "x"), vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());
        let blob = BlobRef::new("b", "gone.mp3");

        assert!(matches!(
            store.download(&blob).await,
            Err(PipelineError::NotFound { .. })
        ));
        store.upload(&blob, vec![1]).await.unwrap();
        assert!(store.delete(&blob).await.unwrap());
        assert!(store.metadata(&blob).await.unwrap().is_none());
    }
}
