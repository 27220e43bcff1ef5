//! Error types for the polyphon pipeline.
//!
//! Every failure a stage can hit is one of these variants, and every variant
//! knows which delivery [`Outcome`] it turns into at the dispatch boundary.

use crate::core::Outcome;
use std::collections::HashMap;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required message field is missing or empty.
    #[error("{0}")]
    Validation(#[from] MissingFieldError),

    /// An external capability, the bus or the blob store failed transiently.
    #[error("{0}")]
    Transient(#[from] TransientCapabilityError),

    /// Unsupported language or invalid settings.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Only part of a fan-out was published.
    #[error("{0}")]
    PartialFanOut(#[from] PartialFanOutFailure),

    /// An external capability rejected the request for good.
    #[error("Permanent {capability} failure: {reason}")]
    Permanent {
        /// The capability that failed.
        capability: String,
        /// Why it failed.
        reason: String,
    },

    /// A referenced blob does not exist.
    #[error("Blob not found: {bucket}/{name}")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Object name.
        name: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The operation is intentionally not implemented.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a permanent capability error.
    #[must_use]
    pub fn permanent(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permanent {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Creates a blob-not-found error.
    #[must_use]
    pub fn not_found(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Short machine-readable name of the variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Transient(_) => "TransientCapabilityError",
            Self::Configuration(_) => "ConfigurationError",
            Self::PartialFanOut(_) => "PartialFanOutFailure",
            Self::Permanent { .. } => "PermanentCapabilityError",
            Self::NotFound { .. } => "BlobNotFound",
            Self::Serialization(_) => "SerializationError",
            Self::Unsupported(_) => "Unsupported",
            Self::Io(_) => "IoError",
        }
    }

    /// The delivery outcome this failure maps to.
    ///
    /// Malformed input and misconfiguration are never usefully retried, so
    /// they end as `Fatal`. Everything that might succeed on another attempt
    /// is `Nack`.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Validation(_)
            | Self::Configuration(_)
            | Self::Permanent { .. }
            | Self::Serialization(_)
            | Self::Unsupported(_) => Outcome::Fatal,
            Self::Transient(_) | Self::PartialFanOut(_) | Self::NotFound { .. } | Self::Io(_) => {
                Outcome::Nack
            }
        }
    }

    /// Returns true if redelivery could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.outcome() == Outcome::Nack
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));

        match self {
            Self::Validation(err) => {
                map.insert("field".to_string(), serde_json::json!(err.field));
            }
            Self::Transient(err) => {
                map.insert("capability".to_string(), serde_json::json!(err.capability));
            }
            Self::Configuration(err) => {
                if let Some(ref lang) = err.language {
                    map.insert("language".to_string(), serde_json::json!(lang));
                }
            }
            Self::PartialFanOut(err) => {
                map.insert("attempted".to_string(), serde_json::json!(err.attempted));
                map.insert("published".to_string(), serde_json::json!(err.published));
            }
            Self::Permanent { capability, .. } => {
                map.insert("capability".to_string(), serde_json::json!(capability));
            }
            Self::NotFound { bucket, name } => {
                map.insert("bucket".to_string(), serde_json::json!(bucket));
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::Serialization(_) | Self::Unsupported(_) | Self::Io(_) => {}
        }

        map
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when a required message field is absent or empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} is not provided. Make sure you have property {field} in the request")]
pub struct MissingFieldError {
    /// The missing field.
    pub field: String,
    /// Topic the message arrived on, when known.
    pub topic: Option<String>,
}

impl MissingFieldError {
    /// Creates a new missing field error.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            topic: None,
        }
    }

    /// Records the topic the message arrived on.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// Error raised when a collaborator call fails in a way that may clear up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transient {capability} failure: {reason}")]
pub struct TransientCapabilityError {
    /// The capability (labeling, translation, synthesis, storage, bus).
    pub capability: String,
    /// Why it failed.
    pub reason: String,
}

impl TransientCapabilityError {
    /// Creates a new transient error.
    #[must_use]
    pub fn new(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised for unsupported languages and invalid settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The offending language code, if any.
    pub language: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            language: None,
        }
    }

    /// Creates an error for a language code with no voice mapping.
    #[must_use]
    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        let lang = lang.into();
        Self {
            message: format!("no speech voice configured for language '{lang}'"),
            language: Some(lang),
        }
    }

    /// Creates an error for an invalid settings key.
    #[must_use]
    pub fn invalid(key: &str, message: impl std::fmt::Display) -> Self {
        Self::new(format!("invalid value for {key}: {message}"))
    }
}

/// Error raised when a fan-out published some but not all of its branches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Fan-out from {stage} incomplete: {published}/{attempted} published ({})", failures.join("; "))]
pub struct PartialFanOutFailure {
    /// The stage that fanned out.
    pub stage: String,
    /// Number of publishes attempted.
    pub attempted: usize,
    /// Number of publishes acknowledged.
    pub published: usize,
    /// One entry per failed branch.
    pub failures: Vec<String>,
}

impl PartialFanOutFailure {
    /// Creates a new partial fan-out failure.
    #[must_use]
    pub fn new(stage: impl Into<String>, attempted: usize, failures: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            attempted,
            published: attempted.saturating_sub(failures.len()),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message_names_field() {
        let err = MissingFieldError::new("filename").with_topic("labels-topic");
        assert!(err.to_string().contains("filename is not provided"));
        assert_eq!(err.topic.as_deref(), Some("labels-topic"));
    }

    #[test]
    fn test_outcome_mapping() {
        let validation: PipelineError = MissingFieldError::new("text").into();
        assert_eq!(validation.outcome(), Outcome::Fatal);

        let transient: PipelineError = TransientCapabilityError::new("translation", "503").into();
        assert_eq!(transient.outcome(), Outcome::Nack);

        let config: PipelineError = ConfigurationError::unsupported_language("xx").into();
        assert_eq!(config.outcome(), Outcome::Fatal);

        let partial: PipelineError =
            PartialFanOutFailure::new("label", 2, vec!["fr: bus down".to_string()]).into();
        assert_eq!(partial.outcome(), Outcome::Nack);

        assert_eq!(PipelineError::permanent("synthesis", "bad voice").outcome(), Outcome::Fatal);
        assert_eq!(PipelineError::not_found("b", "n").outcome(), Outcome::Nack);
        assert_eq!(PipelineError::Unsupported("x".into()).outcome(), Outcome::Fatal);
    }

    #[test]
    fn test_partial_fan_out_counts() {
        let err = PartialFanOutFailure::new("label", 3, vec!["de: timeout".to_string()]);
        assert_eq!(err.published, 2);
        assert!(err.to_string().contains("2/3"));
    }

    #[test]
    fn test_to_dict() {
        let err: PipelineError = MissingFieldError::new("lang").into();
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "ValidationError");
        assert_eq!(dict.get("field").unwrap(), "lang");
        assert_eq!(dict.get("retryable").unwrap(), false);
    }

    #[test]
    fn test_unsupported_language() {
        let err = ConfigurationError::unsupported_language("kl");
        assert_eq!(err.language.as_deref(), Some("kl"));
        assert!(err.to_string().contains("'kl'"));
    }
}
