//! A fully in-memory pipeline for tests.

use super::mocks::{DictionaryTranslator, StaticLabeler, ToneSynthesizer};
use crate::bus::{InMemoryBus, RedeliveryPolicy};
use crate::capabilities::Capabilities;
use crate::config::PipelineSettings;
use crate::context::PipelineContext;
use crate::core::{BlobRef, Event};
use crate::dispatch::Dispatcher;
use crate::errors::Result;
use crate::events::CollectingEventSink;
use crate::runtime::PipelineRunner;
use crate::stages::{
    ingest_photo, CollectingAudioSink, DeliverStage, LabelStage, SynthesizeStage, TranslateStage,
};
use crate::storage::{BlobStore, InMemoryBlobStore};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`PipelineFixture`].
#[derive(Debug)]
pub struct FixtureBuilder {
    settings: PipelineSettings,
    labeler: StaticLabeler,
    translator: DictionaryTranslator,
    dedup_window: Option<Duration>,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            settings: PipelineSettings::default().with_redelivery(RedeliveryPolicy::immediate(3)),
            labeler: StaticLabeler::default(),
            translator: DictionaryTranslator::new(),
            dedup_window: Some(Duration::from_secs(60)),
        }
    }
}

impl FixtureBuilder {
    /// Uses these settings.
    #[must_use]
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Uses this labeler.
    #[must_use]
    pub fn labeler(mut self, labeler: StaticLabeler) -> Self {
        self.labeler = labeler;
        self
    }

    /// Uses this translator.
    #[must_use]
    pub fn translator(mut self, translator: DictionaryTranslator) -> Self {
        self.translator = translator;
        self
    }

    /// Turns off publish de-duplication on the bus.
    #[must_use]
    pub fn without_dedup(mut self) -> Self {
        self.dedup_window = None;
        self
    }

    /// Wires everything together.
    pub fn build(self) -> Result<PipelineFixture> {
        let settings = self.settings;
        let mut bus = InMemoryBus::new(settings.redelivery.clone());
        if let Some(window) = self.dedup_window {
            bus = bus.with_dedup_window(window);
        }
        let bus = Arc::new(bus);
        let store = Arc::new(InMemoryBlobStore::new());
        let labeler = Arc::new(self.labeler);
        let translator = Arc::new(self.translator);
        let synthesizer = Arc::new(ToneSynthesizer::new());
        let events = Arc::new(CollectingEventSink::new());
        let audio = Arc::new(CollectingAudioSink::new());

        let capabilities = Capabilities::new(labeler.clone(), translator.clone(), synthesizer.clone());
        let ctx = Arc::new(
            PipelineContext::new(settings.clone(), bus.clone(), store.clone(), capabilities)
                .with_event_sink(events.clone()),
        );

        let deliver = Arc::new(DeliverStage::new(&settings, audio.clone()));
        let mut dispatcher = Dispatcher::new(ctx.clone());
        dispatcher.register(Arc::new(LabelStage::new(&settings)))?;
        dispatcher.register(Arc::new(TranslateStage::new(&settings)))?;
        dispatcher.register(Arc::new(SynthesizeStage::new(&settings)))?;
        dispatcher.register(deliver.clone())?;

        Ok(PipelineFixture {
            settings,
            bus,
            store,
            labeler,
            translator,
            synthesizer,
            events,
            audio,
            deliver,
            ctx,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// In-memory bus, blob store, capability doubles and collecting sinks,
/// wired into a standard dispatcher.
#[derive(Debug)]
pub struct PipelineFixture {
    /// Settings in use.
    pub settings: PipelineSettings,
    /// The bus.
    pub bus: Arc<InMemoryBus>,
    /// The blob store.
    pub store: Arc<InMemoryBlobStore>,
    /// Labeler double.
    pub labeler: Arc<StaticLabeler>,
    /// Translator double.
    pub translator: Arc<DictionaryTranslator>,
    /// Synthesizer double.
    pub synthesizer: Arc<ToneSynthesizer>,
    /// Lifecycle events.
    pub events: Arc<CollectingEventSink>,
    /// Delivered audio.
    pub audio: Arc<CollectingAudioSink>,
    /// The delivery stage, for its branch tracker.
    pub deliver: Arc<DeliverStage>,
    /// Shared context.
    pub ctx: Arc<PipelineContext>,
    /// The dispatcher.
    pub dispatcher: Arc<Dispatcher>,
}

impl PipelineFixture {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::default()
    }

    /// Default settings with a labeler reporting `labels`.
    pub fn with_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder().labeler(StaticLabeler::new(labels)).build()
    }

    /// A runner subscribed to every topic-triggered stage.
    pub async fn runner(&self) -> Result<PipelineRunner> {
        let mut runner = PipelineRunner::new(self.dispatcher.clone(), self.bus.clone());
        runner.attach().await?;
        Ok(runner)
    }

    /// Uploads a photo to the input bucket and returns its trigger.
    pub async fn upload_photo(&self, name: &str) -> Result<Event> {
        ingest_photo(
            self.store.as_ref(),
            &self.settings.buckets.input,
            name,
            b"\xFF\xD8\xFFjpeg".to_vec(),
        )
        .await
    }

    /// Audio object names in the output bucket.
    pub async fn audio_objects(&self) -> Result<Vec<String>> {
        self.store.list(&self.settings.buckets.output).await
    }

    /// Content of an audio object in the output bucket.
    pub async fn audio_object(&self, name: &str) -> Result<Vec<u8>> {
        self.store
            .download(&BlobRef::new(self.settings.buckets.output.clone(), name))
            .await
    }
}
