//! Typed views of the pipeline's message schemas.

use super::MessageContract;
use crate::core::{BlobRef, CorrelationKey, Message};
use crate::errors::MissingFieldError;
use serde::{Deserialize, Serialize};

/// Blob write that triggers labeling: `{bucket, name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
    /// Bucket the image landed in.
    pub bucket: String,
    /// Object name, which doubles as the request id.
    pub name: String,
}

impl ImageUpload {
    /// Required fields.
    pub const CONTRACT: MessageContract = MessageContract::new("image_upload", &["bucket", "name"]);

    /// The uploaded image.
    #[must_use]
    pub fn blob(&self) -> BlobRef {
        BlobRef::new(self.bucket.clone(), self.name.clone())
    }
}

impl TryFrom<&Message> for ImageUpload {
    type Error = MissingFieldError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        Ok(Self {
            bucket: message.require("bucket")?.to_string(),
            name: message.require("name")?.to_string(),
        })
    }
}

/// Labels topic: text to translate into one target language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelsMessage {
    /// Extracted label text.
    pub text: String,
    /// Original image filename.
    pub filename: String,
    /// Target language.
    pub lang: String,
    /// Source language of `text`.
    pub src_lang: String,
}

impl LabelsMessage {
    /// Required fields.
    pub const CONTRACT: MessageContract =
        MessageContract::new("labels", &["text", "filename", "lang", "src_lang"]);

    /// The branch this message belongs to.
    #[must_use]
    pub fn correlation(&self) -> CorrelationKey {
        CorrelationKey::new(self.filename.clone(), self.lang.clone())
    }

    /// Converts into a bus message.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::new()
            .with_field("text", self.text)
            .with_field("filename", self.filename)
            .with_field("lang", self.lang)
            .with_field("src_lang", self.src_lang)
    }
}

impl TryFrom<&Message> for LabelsMessage {
    type Error = MissingFieldError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        Ok(Self {
            text: message.require("text")?.to_string(),
            filename: message.require("filename")?.to_string(),
            lang: message.require("lang")?.to_string(),
            src_lang: message.require("src_lang")?.to_string(),
        })
    }
}

/// Translated text topic. The source language is no longer carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedTextMessage {
    /// Text in the target language.
    pub text: String,
    /// Original image filename.
    pub filename: String,
    /// Target language.
    pub lang: String,
}

impl TranslatedTextMessage {
    /// Required fields.
    pub const CONTRACT: MessageContract =
        MessageContract::new("translated_text", &["text", "filename", "lang"]);

    /// The branch this message belongs to.
    #[must_use]
    pub fn correlation(&self) -> CorrelationKey {
        CorrelationKey::new(self.filename.clone(), self.lang.clone())
    }

    /// Converts into a bus message.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::new()
            .with_field("text", self.text)
            .with_field("filename", self.filename)
            .with_field("lang", self.lang)
    }
}

impl TryFrom<&Message> for TranslatedTextMessage {
    type Error = MissingFieldError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        Ok(Self {
            text: message.require("text")?.to_string(),
            filename: message.require("filename")?.to_string(),
            lang: message.require("lang")?.to_string(),
        })
    }
}

/// Audio ready topic: where to fetch one branch's audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mp3ReadyMessage {
    /// Original image filename.
    pub original_filename: String,
    /// Language of the audio.
    pub lang: String,
    /// Bucket holding the audio.
    pub bucket: String,
    /// Audio object name.
    pub mp3_filename: String,
}

impl Mp3ReadyMessage {
    /// Required fields.
    pub const CONTRACT: MessageContract = MessageContract::new(
        "mp3_ready",
        &["original_filename", "lang", "bucket", "mp3_filename"],
    );

    /// The branch this message belongs to.
    #[must_use]
    pub fn correlation(&self) -> CorrelationKey {
        CorrelationKey::new(self.original_filename.clone(), self.lang.clone())
    }

    /// The referenced audio blob.
    #[must_use]
    pub fn blob(&self) -> BlobRef {
        BlobRef::new(self.bucket.clone(), self.mp3_filename.clone())
    }

    /// Converts into a bus message.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::new()
            .with_field("original_filename", self.original_filename)
            .with_field("lang", self.lang)
            .with_field("bucket", self.bucket)
            .with_field("mp3_filename", self.mp3_filename)
    }
}

impl TryFrom<&Message> for Mp3ReadyMessage {
    type Error = MissingFieldError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        Ok(Self {
            original_filename: message.require("original_filename")?.to_string(),
            lang: message.require("lang")?.to_string(),
            bucket: message.require("bucket")?.to_string(),
            mp3_filename: message.require("mp3_filename")?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_message_fields() {
        let message = LabelsMessage {
            text: "cat, dog, ".to_string(),
            filename: "photo.jpg".to_string(),
            lang: "fr".to_string(),
            src_lang: "en".to_string(),
        }
        .into_message();

        assert!(LabelsMessage::CONTRACT.validate(&message).is_ok());
        assert_eq!(message.get("src_lang"), Some("en"));

        let parsed = LabelsMessage::try_from(&message).unwrap();
        assert_eq!(parsed.correlation(), CorrelationKey::new("photo.jpg", "fr"));
    }

    #[test]
    fn test_translated_text_has_no_source_language() {
        let message = TranslatedTextMessage {
            text: "chat, ".to_string(),
            filename: "photo.jpg".to_string(),
            lang: "fr".to_string(),
        }
        .into_message();

        assert!(!message.contains("src_lang"));
        assert_eq!(message.len(), 3);
    }

    #[test]
    fn test_mp3_ready_missing_bucket() {
        let message = Message::new()
            .with_field("original_filename", "photo.jpg")
            .with_field("lang", "en")
            .with_field("mp3_filename", "photo_en.mp3");

        let err = Mp3ReadyMessage::try_from(&message).unwrap_err();
        assert_eq!(err.field, "bucket");
    }

    #[test]
    fn test_mp3_ready_blob() {
        let ready = Mp3ReadyMessage {
            original_filename: "photo.jpg".to_string(),
            lang: "en".to_string(),
            bucket: "audio-out".to_string(),
            mp3_filename: "photo_en.mp3".to_string(),
        };
        assert_eq!(ready.blob(), BlobRef::new("audio-out", "photo_en.mp3"));
    }
}
