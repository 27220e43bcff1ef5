//! Pipeline settings document.

use super::VoiceTable;
use crate::bus::RedeliveryPolicy;
use crate::core::{Topic, LABELS_TOPIC, MP3_READY_TOPIC, TRANSLATED_TEXT_TOPIC};
use crate::errors::{ConfigurationError, PipelineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Topic names used between stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNames {
    /// Label to Translate.
    #[serde(default = "default_labels_topic")]
    pub labels: Topic,
    /// Translate to Synthesize.
    #[serde(default = "default_translated_text_topic")]
    pub translated_text: Topic,
    /// Synthesize to Deliver.
    #[serde(default = "default_mp3_ready_topic")]
    pub mp3_ready: Topic,
}

fn default_labels_topic() -> Topic {
    Topic::new(LABELS_TOPIC)
}

fn default_translated_text_topic() -> Topic {
    Topic::new(TRANSLATED_TEXT_TOPIC)
}

fn default_mp3_ready_topic() -> Topic {
    Topic::new(MP3_READY_TOPIC)
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            labels: default_labels_topic(),
            translated_text: default_translated_text_topic(),
            mp3_ready: default_mp3_ready_topic(),
        }
    }
}

/// Bucket names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNames {
    /// Raw images; writes here trigger Label.
    #[serde(default = "default_input_bucket")]
    pub input: String,
    /// Synthesized audio.
    #[serde(default = "default_output_bucket")]
    pub output: String,
    /// Read-only settings documents.
    #[serde(default = "default_configuration_bucket")]
    pub configuration: String,
}

fn default_input_bucket() -> String {
    "photos-in".to_string()
}

fn default_output_bucket() -> String {
    "audio-out".to_string()
}

fn default_configuration_bucket() -> String {
    "pipeline-settings".to_string()
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            input: default_input_bucket(),
            output: default_output_bucket(),
            configuration: default_configuration_bucket(),
        }
    }
}

/// Settings for a pipeline deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Language the labeler reports in.
    #[serde(default = "default_source_language")]
    pub source_language: String,
    /// One branch is produced per entry, in this order.
    #[serde(default = "default_target_languages")]
    pub target_languages: Vec<String>,
    /// Topic names.
    #[serde(default)]
    pub topics: TopicNames,
    /// Bucket names.
    #[serde(default)]
    pub buckets: BucketNames,
    /// Settings object name inside the configuration bucket.
    #[serde(default = "default_configuration_object")]
    pub configuration_object: String,
    /// Text used when the labeler returns nothing.
    #[serde(default = "default_empty_labels_text")]
    pub empty_labels_text: String,
    /// Voice per language.
    #[serde(default)]
    pub voices: VoiceTable,
    /// Upper bound on one stage invocation.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: f64,
    /// Bus redelivery policy.
    #[serde(default)]
    pub redelivery: RedeliveryPolicy,
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_languages() -> Vec<String> {
    vec!["en".to_string(), "fr".to_string()]
}

fn default_configuration_object() -> String {
    "pipeline-settings.json".to_string()
}

fn default_empty_labels_text() -> String {
    "did not see anything, sorry".to_string()
}

fn default_stage_timeout() -> f64 {
    60.0
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_languages: default_target_languages(),
            topics: TopicNames::default(),
            buckets: BucketNames::default(),
            configuration_object: default_configuration_object(),
            empty_labels_text: default_empty_labels_text(),
            voices: VoiceTable::default(),
            stage_timeout_seconds: default_stage_timeout(),
            redelivery: RedeliveryPolicy::default(),
        }
    }
}

const LANGUAGE_CODE_PATTERN: &str = r"^[a-z]{2,3}(-[A-Za-z0-9]{2,8})*$";

impl PipelineSettings {
    /// Creates default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON settings document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and validates a JSON settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Sets the source language.
    #[must_use]
    pub fn with_source_language(mut self, lang: impl Into<String>) -> Self {
        self.source_language = lang.into();
        self
    }

    /// Sets the target languages.
    #[must_use]
    pub fn with_target_languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_languages = langs.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the voice table.
    #[must_use]
    pub fn with_voices(mut self, voices: VoiceTable) -> Self {
        self.voices = voices;
        self
    }

    /// Sets the stage timeout.
    #[must_use]
    pub fn with_stage_timeout(mut self, seconds: f64) -> Self {
        self.stage_timeout_seconds = seconds;
        self
    }

    /// Sets the redelivery policy.
    #[must_use]
    pub fn with_redelivery(mut self, policy: RedeliveryPolicy) -> Self {
        self.redelivery = policy;
        self
    }

    /// Stage timeout as a duration.
    ///
    /// Values [`validate`](Self::validate) would reject never panic here:
    /// too large saturates, anything else falls back to the default.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.stage_timeout_seconds) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            Err(_) if self.stage_timeout_seconds > 0.0 => Duration::MAX,
            _ => Duration::from_secs_f64(default_stage_timeout()),
        }
    }

    /// Checks the settings for values no stage can work with.
    ///
    /// A target language without a voice is only warned about: its branch
    /// fails at synthesis, the others still complete.
    pub fn validate(&self) -> Result<()> {
        let pattern = Regex::new(LANGUAGE_CODE_PATTERN)
            .map_err(|e| invalid("language code pattern", e))?;

        if !pattern.is_match(&self.source_language) {
            return Err(invalid("source_language", format!("'{}' is not a language code", self.source_language)));
        }
        if self.target_languages.is_empty() {
            return Err(invalid("target_languages", "at least one language is required"));
        }

        let mut seen = BTreeSet::new();
        for lang in &self.target_languages {
            if !pattern.is_match(lang) {
                return Err(invalid("target_languages", format!("'{lang}' is not a language code")));
            }
            if !seen.insert(lang.as_str()) {
                return Err(invalid("target_languages", format!("'{lang}' is listed twice")));
            }
            if !self.voices.supports(lang) {
                warn!(lang = %lang, "Target language has no voice configured");
            }
        }

        if self.empty_labels_text.trim().is_empty() {
            return Err(invalid("empty_labels_text", "must not be empty"));
        }
        if !matches!(Duration::try_from_secs_f64(self.stage_timeout_seconds), Ok(t) if !t.is_zero()) {
            return Err(invalid(
                "stage_timeout_seconds",
                format!("{} is not a usable number of seconds", self.stage_timeout_seconds),
            ));
        }
        if self.redelivery.max_attempts == 0 {
            return Err(invalid("redelivery.max_attempts", "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: impl std::fmt::Display) -> PipelineError {
    ConfigurationError::invalid(key, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();

        assert_eq!(settings.source_language, "en");
        assert_eq!(settings.target_languages, vec!["en", "fr"]);
        assert_eq!(settings.topics.labels.as_str(), "labels-topic");
        assert_eq!(settings.empty_labels_text, "did not see anything, sorry");
        assert_eq!(settings.stage_timeout(), Duration::from_secs(60));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let settings =
            PipelineSettings::from_json_str(r#"{"target_languages": ["fr"], "buckets": {"input": "cam"}}"#)
                .unwrap();

        assert_eq!(settings.target_languages, vec!["fr"]);
        assert_eq!(settings.buckets.input, "cam");
        assert_eq!(settings.buckets.output, "audio-out");
        assert_eq!(settings.source_language, "en");
    }

    #[test]
    fn test_rejects_empty_languages() {
        let err = PipelineSettings::from_json_str(r#"{"target_languages": []}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_rejects_malformed_and_duplicate_codes() {
        assert!(PipelineSettings::default()
            .with_target_languages(["en", "French"])
            .validate()
            .is_err());
        assert!(PipelineSettings::default()
            .with_target_languages(["fr", "fr"])
            .validate()
            .is_err());
        assert!(PipelineSettings::default()
            .with_target_languages(["pt-BR"])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_rejects_empty_placeholder_and_bad_timeout() {
        let mut settings = PipelineSettings::default();
        settings.empty_labels_text = "  ".to_string();
        assert!(settings.validate().is_err());

        assert!(PipelineSettings::default().with_stage_timeout(0.0).validate().is_err());
        assert!(PipelineSettings::default().with_stage_timeout(-1.0).validate().is_err());
        assert!(PipelineSettings::default().with_stage_timeout(f64::NAN).validate().is_err());
        assert!(PipelineSettings::default().with_stage_timeout(0.25).validate().is_ok());
    }

    #[test]
    fn test_rejects_timeout_beyond_duration_range() {
        let err = PipelineSettings::from_json_str(r#"{"stage_timeout_seconds": 1e20}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("stage_timeout_seconds"));
    }

    #[test]
    fn test_stage_timeout_never_panics() {
        assert_eq!(PipelineSettings::default().with_stage_timeout(1e20).stage_timeout(), Duration::MAX);
        assert_eq!(
            PipelineSettings::default().with_stage_timeout(f64::NAN).stage_timeout(),
            Duration::from_secs(60)
        );
        assert_eq!(
            PipelineSettings::default().with_stage_timeout(-5.0).stage_timeout(),
            Duration::from_secs(60)
        );
        assert_eq!(
            PipelineSettings::default().with_stage_timeout(1.5).stage_timeout(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_language_without_voice_is_allowed() {
        let settings = PipelineSettings::default().with_target_languages(["en", "de"]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = PipelineSettings::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }
}
