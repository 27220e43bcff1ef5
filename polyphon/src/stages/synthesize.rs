//! Synthesize stage.

use super::{Stage, StageReport, StageTrigger};
use crate::config::PipelineSettings;
use crate::context::PipelineContext;
use crate::contracts::{MessageContract, Mp3ReadyMessage, TranslatedTextMessage};
use crate::core::{BlobRef, CorrelationKey, Message, Topic};
use crate::errors::Result;
use async_trait::async_trait;
use tracing::info;

/// Output object name for a branch: `{base}_{lang}.mp3`.
///
/// `base` is `filename` without its last extension. A dot inside a
/// directory component is not an extension.
#[must_use]
pub fn audio_object_name(filename: &str, lang: &str) -> String {
    let dir_end = filename.rfind('/').map_or(0, |i| i + 1);
    let base = match filename[dir_end..].rfind('.') {
        Some(dot) => &filename[..dir_end + dot],
        None => filename,
    };
    format!("{base}_{lang}.mp3")
}

/// Turns a branch's text into MP3 audio in the output bucket.
#[derive(Debug, Clone)]
pub struct SynthesizeStage {
    input: Topic,
    output: Topic,
    bucket: String,
}

impl SynthesizeStage {
    /// Creates the stage from settings.
    #[must_use]
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            input: settings.topics.translated_text.clone(),
            output: settings.topics.mp3_ready.clone(),
            bucket: settings.buckets.output.clone(),
        }
    }
}

#[async_trait]
impl Stage for SynthesizeStage {
    fn name(&self) -> &str {
        "synthesize"
    }

    fn trigger(&self) -> StageTrigger {
        StageTrigger::topic(self.input.clone())
    }

    fn contract(&self) -> MessageContract {
        TranslatedTextMessage::CONTRACT
    }

    fn correlation(&self, message: &Message) -> Option<CorrelationKey> {
        TranslatedTextMessage::try_from(message).ok().map(|m| m.correlation())
    }

    async fn handle(&self, ctx: &PipelineContext, message: &Message) -> Result<StageReport> {
        let translated = TranslatedTextMessage::try_from(message)?;
        let key = translated.correlation();

        // Resolve before synthesizing: an unknown language must not cost a call.
        let voice = ctx.settings().voices.resolve(&translated.lang)?.clone();

        let speech = ctx.synthesizer.synthesize(&translated.text, &voice).await?;
        let name = audio_object_name(&translated.filename, &translated.lang);
        let blob = BlobRef::new(self.bucket.clone(), name.clone());

        let meta = ctx.store.upload(&blob, speech.audio).await?;
        info!(branch = %key, blob = %blob, locale = %voice.locale, size = meta.size, "Audio stored");

        let ready = Mp3ReadyMessage {
            original_filename: translated.filename,
            lang: translated.lang,
            bucket: self.bucket.clone(),
            mp3_filename: name,
        };
        let message_id = ctx.bus.publish(&self.output, ready.into_message()).await?;

        Ok(StageReport::new(self.name())
            .with_blob(blob)
            .with_published(self.output.clone(), message_id, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_object_name() {
        assert_eq!(audio_object_name("photo.jpg", "fr"), "photo_fr.mp3");
        assert_eq!(audio_object_name("photo", "en"), "photo_en.mp3");
        assert_eq!(audio_object_name("archive.tar.gz", "en"), "archive.tar_en.mp3");
        assert_eq!(audio_object_name("2024.05/shot", "fr"), "2024.05/shot_fr.mp3");
        assert_eq!(audio_object_name("cam/in_photo.jpg", "fr"), "cam/in_photo_fr.mp3");
    }
}
