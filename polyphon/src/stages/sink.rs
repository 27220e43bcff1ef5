//! Where delivered audio ends up.

use crate::core::CorrelationKey;
use crate::errors::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One delivered audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredAudio {
    /// Branch the audio belongs to.
    pub correlation: CorrelationKey,
    /// Object name in the output bucket.
    pub name: String,
    /// MP3 bytes.
    pub audio: Vec<u8>,
}

/// Receives finished audio. Must tolerate the same branch arriving twice.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Accepts one delivered branch.
    async fn deliver(&self, audio: DeliveredAudio) -> Result<()>;
}

/// Keeps the latest audio per branch in memory.
#[derive(Debug, Default)]
pub struct CollectingAudioSink {
    delivered: RwLock<Vec<DeliveredAudio>>,
}

impl CollectingAudioSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered audio, one entry per branch, in first-arrival order.
    #[must_use]
    pub fn delivered(&self) -> Vec<DeliveredAudio> {
        self.delivered.read().clone()
    }

    /// Audio for one branch.
    #[must_use]
    pub fn get(&self, key: &CorrelationKey) -> Option<DeliveredAudio> {
        self.delivered
            .read()
            .iter()
            .find(|d| &d.correlation == key)
            .cloned()
    }

    /// Number of branches delivered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delivered.read().len()
    }

    /// Returns true if nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delivered.read().is_empty()
    }
}

#[async_trait]
impl AudioSink for CollectingAudioSink {
    async fn deliver(&self, audio: DeliveredAudio) -> Result<()> {
        let mut delivered = self.delivered.write();
        match delivered.iter_mut().find(|d| d.correlation == audio.correlation) {
            Some(existing) => *existing = audio,
            None => delivered.push(audio),
        }
        Ok(())
    }
}

/// Writes each delivered file into a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryAudioSink {
    dir: PathBuf,
}

impl DirectoryAudioSink {
    /// Creates a sink writing into `dir`, created on first delivery.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AudioSink for DirectoryAudioSink {
    async fn deliver(&self, audio: DeliveredAudio) -> Result<()> {
        // Flatten object paths so nothing escapes the directory.
        let file_name = audio.name.replace(['/', '\\'], "_");
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, &audio.audio).await?;
        debug!(path = %path.display(), branch = %audio.correlation, "Audio written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(lang: &str, bytes: &[u8]) -> DeliveredAudio {
        DeliveredAudio {
            correlation: CorrelationKey::new("photo.jpg", lang),
            name: format!("photo_{lang}.mp3"),
            audio: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_collecting_sink_replaces_redelivered_branch() {
        let sink = CollectingAudioSink::new();
        sink.deliver(audio("fr", b"v1")).await.unwrap();
        sink.deliver(audio("en", b"en")).await.unwrap();
        sink.deliver(audio("fr", b"v2")).await.unwrap();

        assert_eq!(sink.len(), 2);
        let fr = sink.get(&CorrelationKey::new("photo.jpg", "fr")).unwrap();
        assert_eq!(fr.audio, b"v2");
    }

    #[tokio::test]
    async fn test_directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryAudioSink::new(dir.path().join("out"));

        sink.deliver(audio("fr", b"ID3")).await.unwrap();

        let written = std::fs::read(dir.path().join("out/photo_fr.mp3")).unwrap();
        assert_eq!(written, b"ID3");
    }
}
