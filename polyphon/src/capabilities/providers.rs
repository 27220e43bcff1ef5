//! Capability response types.

use serde::{Deserialize, Serialize};

/// One label detected in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAnnotation {
    pub description: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
}

impl LabelAnnotation {
    /// Creates an annotation with full confidence.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            score: 1.0,
            mid: None,
        }
    }

    /// Sets the confidence score.
    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }
}

/// Synthesized audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResponse {
    #[serde(skip)]
    pub audio: Vec<u8>,
    pub locale: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters_processed: Option<usize>,
}

impl SynthesisResponse {
    /// Creates an MP3 response.
    #[must_use]
    pub fn mp3(audio: Vec<u8>, locale: impl Into<String>) -> Self {
        Self {
            audio,
            locale: locale.into(),
            format: "mp3".to_string(),
            characters_processed: None,
        }
    }

    /// Returns the byte count.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.audio.len()
    }
}
