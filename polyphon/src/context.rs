//! Shared clients handed to every stage.

use crate::bus::MessageBus;
use crate::capabilities::{Capabilities, ImageLabeler, SpeechSynthesizer, Translator};
use crate::config::PipelineSettings;
use crate::events::{EventSink, NoOpEventSink};
use crate::storage::BlobStore;
use std::sync::Arc;

/// Everything a stage handler may touch.
///
/// Built once at startup and passed to the dispatcher explicitly. Stages
/// hold no state of their own beyond what lives here.
#[derive(Clone)]
pub struct PipelineContext {
    /// Deployment settings.
    pub settings: Arc<PipelineSettings>,
    /// Message bus.
    pub bus: Arc<dyn MessageBus>,
    /// Blob store.
    pub store: Arc<dyn BlobStore>,
    /// Image labeling client.
    pub labeler: Arc<dyn ImageLabeler>,
    /// Translation client.
    pub translator: Arc<dyn Translator>,
    /// Speech synthesis client.
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Lifecycle event sink.
    pub events: Arc<dyn EventSink>,
}

impl PipelineContext {
    /// Creates a context with a no-op event sink.
    #[must_use]
    pub fn new(
        settings: PipelineSettings,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn BlobStore>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            bus,
            store,
            labeler: capabilities.labeler,
            translator: capabilities.translator,
            synthesizer: capabilities.synthesizer,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Shorthand for the settings.
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("source_language", &self.settings.source_language)
            .field("target_languages", &self.settings.target_languages)
            .finish_non_exhaustive()
    }
}
