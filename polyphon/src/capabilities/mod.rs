//! External capabilities the stages call out to.
//!
//! Labeling, translation and speech synthesis are opaque collaborators.
//! Stages only see these traits; real clients and test doubles implement
//! them and are handed to stages through [`crate::context::PipelineContext`].

mod providers;

pub use providers::{LabelAnnotation, SynthesisResponse};

use crate::config::VoiceConfig;
use crate::core::BlobRef;
use crate::errors::{PipelineError, TransientCapabilityError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The call may succeed if retried.
    #[error("{capability} temporarily unavailable: {reason}")]
    Transient {
        /// Capability name.
        capability: String,
        /// Why it failed.
        reason: String,
    },
    /// The call will never succeed for this input.
    #[error("{capability} rejected the request: {reason}")]
    Permanent {
        /// Capability name.
        capability: String,
        /// Why it failed.
        reason: String,
    },
}

impl CapabilityError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn permanent(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permanent {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for transient failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<CapabilityError> for PipelineError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Transient { capability, reason } => {
                Self::Transient(TransientCapabilityError::new(capability, reason))
            }
            CapabilityError::Permanent { capability, reason } => {
                Self::permanent(capability, reason)
            }
        }
    }
}

/// Detects labels in an image held in blob storage.
#[async_trait]
pub trait ImageLabeler: Send + Sync {
    /// Returns the annotations, most confident first.
    async fn detect_labels(&self, image: &BlobRef) -> Result<Vec<LabelAnnotation>, CapabilityError>;
}

/// Translates text between languages.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` from `source` to `target`.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, CapabilityError>;
}

/// Turns text into encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes `text` with the given voice.
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SynthesisResponse, CapabilityError>;
}

/// The set of capability clients a pipeline runs with.
#[derive(Clone)]
pub struct Capabilities {
    /// Image labeling client.
    pub labeler: Arc<dyn ImageLabeler>,
    /// Translation client.
    pub translator: Arc<dyn Translator>,
    /// Speech synthesis client.
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Capabilities {
    /// Bundles the three clients.
    #[must_use]
    pub fn new(
        labeler: Arc<dyn ImageLabeler>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            labeler,
            translator,
            synthesizer,
        }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Outcome;

    #[test]
    fn test_transient_maps_to_nack() {
        let err: PipelineError = CapabilityError::transient("translation", "503").into();
        assert!(matches!(err, PipelineError::Transient(_)));
        assert_eq!(err.outcome(), Outcome::Nack);
    }

    #[test]
    fn test_permanent_maps_to_fatal() {
        let cap = CapabilityError::permanent("synthesis", "text too long");
        assert!(!cap.is_transient());

        let err: PipelineError = cap.into();
        assert_eq!(err.outcome(), Outcome::Fatal);
        assert!(err.to_string().contains("synthesis"));
    }
}
