//! Language to voice mapping.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Voice gender requested from the synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    /// No preference.
    #[default]
    Neutral,
    /// Female voice.
    Female,
    /// Male voice.
    Male,
}

/// Output encoding requested from the synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// MPEG layer 3.
    #[default]
    Mp3,
}

/// The voice used for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// BCP-47 locale, e.g. `fr-FR`.
    pub locale: String,
    /// Requested gender.
    #[serde(default)]
    pub gender: VoiceGender,
    /// Requested encoding.
    #[serde(default)]
    pub encoding: AudioEncoding,
}

impl VoiceConfig {
    /// Creates a neutral MP3 voice for a locale.
    #[must_use]
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            gender: VoiceGender::Neutral,
            encoding: AudioEncoding::Mp3,
        }
    }

    /// Sets the gender.
    #[must_use]
    pub fn with_gender(mut self, gender: VoiceGender) -> Self {
        self.gender = gender;
        self
    }
}

/// Static table from short language code to voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceTable(BTreeMap<String, VoiceConfig>);

impl Default for VoiceTable {
    fn default() -> Self {
        Self::new()
            .with_voice("en", VoiceConfig::new("en-US"))
            .with_voice("fr", VoiceConfig::new("fr-FR"))
    }
}

impl VoiceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds or replaces a voice.
    #[must_use]
    pub fn with_voice(mut self, lang: impl Into<String>, voice: VoiceConfig) -> Self {
        self.0.insert(lang.into(), voice);
        self
    }

    /// Looks up the voice for a language.
    pub fn resolve(&self, lang: &str) -> Result<&VoiceConfig, ConfigurationError> {
        self.0
            .get(lang)
            .ok_or_else(|| ConfigurationError::unsupported_language(lang))
    }

    /// Returns true if the language has a voice.
    #[must_use]
    pub fn supports(&self, lang: &str) -> bool {
        self.0.contains_key(lang)
    }

    /// Configured language codes, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of voices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no voice is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = VoiceTable::default();

        assert_eq!(table.resolve("en").unwrap().locale, "en-US");
        assert_eq!(table.resolve("fr").unwrap().locale, "fr-FR");
        assert_eq!(table.resolve("fr").unwrap().gender, VoiceGender::Neutral);
        assert_eq!(table.resolve("fr").unwrap().encoding, AudioEncoding::Mp3);
        assert_eq!(table.languages().collect::<Vec<_>>(), vec!["en", "fr"]);
    }

    #[test]
    fn test_unknown_language() {
        let err = VoiceTable::default().resolve("xx").unwrap_err();
        assert_eq!(err.language.as_deref(), Some("xx"));
    }

    #[test]
    fn test_table_deserializes_as_map() {
        let table: VoiceTable =
            serde_json::from_str(r#"{"de": {"locale": "de-DE", "gender": "female"}}"#).unwrap();

        let voice = table.resolve("de").unwrap();
        assert_eq!(voice.gender, VoiceGender::Female);
        assert!(!table.supports("en"));
    }
}
