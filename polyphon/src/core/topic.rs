//! Topic names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default topic carrying extracted label text, one message per target language.
pub const LABELS_TOPIC: &str = "labels-topic";
/// Default topic carrying translated text.
pub const TRANSLATED_TEXT_TOPIC: &str = "translated-text-topic";
/// Default topic announcing synthesized audio.
pub const MP3_READY_TOPIC: &str = "mp3-ready-topic";

/// A named logical channel on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Creates a topic from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
