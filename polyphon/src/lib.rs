//! # Polyphon
//!
//! An event-driven pipeline that turns an uploaded photo into spoken
//! descriptions in several languages.
//!
//! The interesting part is the orchestration, not the capabilities:
//!
//! - **Stages**: Label, Translate, Synthesize and Deliver each react to one
//!   event and publish zero or more messages
//! - **Fan-out**: one labelled image becomes one branch per target language,
//!   threaded through the pipeline by a `(filename, lang)` correlation key
//! - **Delivery outcomes**: every invocation ends as `Ack`, `Nack` or `Fatal`
//!   at the dispatcher boundary
//! - **Out-of-band payloads**: images and audio travel as blob references
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use polyphon::prelude::*;
//!
//! let ctx = Arc::new(PipelineContext::new(settings, bus.clone(), store.clone(), capabilities));
//! let dispatcher = Arc::new(Dispatcher::standard(ctx.clone(), audio_sink)?);
//! let mut runner = PipelineRunner::new(dispatcher, bus);
//! runner.attach().await?;
//!
//! let event = ingest_photo(store.as_ref(), "photos-in", "photo.jpg", bytes).await?;
//! runner.submit(&event).await;
//! runner.run_until_idle(Duration::from_secs(5)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bus;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod contracts;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod observability;
pub mod runtime;
pub mod stages;
pub mod storage;
pub mod testing;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bus::{
        Delivery, InMemoryBus, MessageBus, RedeliveryPolicy, Subscription,
    };
    pub use crate::capabilities::{
        Capabilities, CapabilityError, ImageLabeler, LabelAnnotation,
        SpeechSynthesizer, Translator,
    };
    pub use crate::config::{
        retrieve_configuration, PipelineSettings, VoiceConfig, VoiceTable,
    };
    pub use crate::context::PipelineContext;
    pub use crate::contracts::{
        ImageUpload, LabelsMessage, MessageContract, Mp3ReadyMessage,
        TranslatedTextMessage,
    };
    pub use crate::core::{
        BlobRef, BranchTracker, CorrelationKey, Envelope, Event, Message,
        Outcome, Topic,
    };
    pub use crate::dispatch::{DispatchResult, Dispatcher};
    pub use crate::errors::{PipelineError, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::runtime::{PipelineRunner, RunSummary};
    pub use crate::stages::{
        ingest_file, ingest_photo, AudioSink, Stage, StageReport, StageTrigger,
    };
    pub use crate::storage::{BlobStore, FileBlobStore, InMemoryBlobStore};
}
