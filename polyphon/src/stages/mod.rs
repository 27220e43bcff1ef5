//! Pipeline stages.
//!
//! A stage reacts to exactly one trigger (a blob write in a bucket or a
//! message on a topic), validates its contract, performs its side effects
//! and publishes zero or more downstream messages.

mod deliver;
mod ingest;
mod label;
mod sink;
mod synthesize;
mod translate;

pub use deliver::DeliverStage;
pub use ingest::{ingest_file, ingest_photo};
pub use label::{describe_labels, LabelStage};
pub use sink::{AudioSink, CollectingAudioSink, DeliveredAudio, DirectoryAudioSink};
pub use synthesize::{audio_object_name, SynthesizeStage};
pub use translate::TranslateStage;

use crate::bus::MessageId;
use crate::context::PipelineContext;
use crate::contracts::MessageContract;
use crate::core::{BlobRef, CorrelationKey, Event, Message, Topic};
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// What a stage reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageTrigger {
    /// Any object written to this bucket.
    BlobWritten {
        /// Bucket name.
        bucket: String,
    },
    /// Any message on this topic.
    Topic {
        /// Topic name.
        topic: Topic,
    },
}

impl StageTrigger {
    /// Trigger on writes to `bucket`.
    #[must_use]
    pub fn blob_written(bucket: impl Into<String>) -> Self {
        Self::BlobWritten {
            bucket: bucket.into(),
        }
    }

    /// Trigger on messages on `topic`.
    #[must_use]
    pub fn topic(topic: impl Into<Topic>) -> Self {
        Self::Topic {
            topic: topic.into(),
        }
    }

    /// Returns true if `event` fires this trigger.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (Self::BlobWritten { bucket }, Event::BlobWritten { bucket: written, .. }) => {
                bucket == written
            }
            (Self::Topic { topic }, Event::BusMessage { topic: arrived, .. }) => topic == arrived,
            _ => false,
        }
    }

    /// The topic, for topic triggers.
    #[must_use]
    pub fn as_topic(&self) -> Option<&Topic> {
        match self {
            Self::Topic { topic } => Some(topic),
            Self::BlobWritten { .. } => None,
        }
    }
}

impl fmt::Display for StageTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlobWritten { bucket } => write!(f, "blob:{bucket}"),
            Self::Topic { topic } => write!(f, "topic:{topic}"),
        }
    }
}

/// One message a stage published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: Topic,
    /// Bus-assigned id.
    pub message_id: MessageId,
    /// The branch the message belongs to.
    pub correlation: CorrelationKey,
}

/// Side effects of one successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name.
    pub stage: String,
    /// Messages published downstream.
    pub published: Vec<PublishedMessage>,
    /// Blobs written.
    pub blobs_written: Vec<BlobRef>,
}

impl StageReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }

    /// Records a publish.
    #[must_use]
    pub fn with_published(mut self, topic: Topic, message_id: MessageId, correlation: CorrelationKey) -> Self {
        self.published.push(PublishedMessage {
            topic,
            message_id,
            correlation,
        });
        self
    }

    /// Records a blob write.
    #[must_use]
    pub fn with_blob(mut self, blob: BlobRef) -> Self {
        self.blobs_written.push(blob);
        self
    }
}

/// A pipeline stage.
///
/// Handlers must be idempotent: the bus delivers at least once and a
/// redelivered message must produce the same blobs and messages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Stage name, used for logs, events and subscription names.
    fn name(&self) -> &str;

    /// The trigger this stage reacts to.
    fn trigger(&self) -> StageTrigger;

    /// Fields the trigger message must carry.
    fn contract(&self) -> MessageContract;

    /// The correlation key of a trigger message, when it has one.
    fn correlation(&self, _message: &Message) -> Option<CorrelationKey> {
        None
    }

    /// Handles one validated trigger message.
    async fn handle(&self, ctx: &PipelineContext, message: &Message) -> Result<StageReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_matching() {
        let blob = StageTrigger::blob_written("photos-in");
        let topic = StageTrigger::topic("labels-topic");

        assert!(blob.matches(&Event::blob_written("photos-in", "a.jpg")));
        assert!(!blob.matches(&Event::blob_written("audio-out", "a.mp3")));
        assert!(!blob.matches(&Event::bus_message("photos-in", Message::new())));
        assert!(topic.matches(&Event::bus_message("labels-topic", Message::new())));
        assert!(!topic.matches(&Event::bus_message("mp3-ready-topic", Message::new())));
        assert_eq!(topic.as_topic().map(Topic::as_str), Some("labels-topic"));
        assert_eq!(blob.to_string(), "blob:photos-in");
    }

    #[test]
    fn test_report_builder() {
        let report = StageReport::new("synthesize")
            .with_blob(BlobRef::new("audio-out", "photo_fr.mp3"))
            .with_published(
                Topic::new("mp3-ready-topic"),
                MessageId::nil(),
                CorrelationKey::new("photo.jpg", "fr"),
            );

        assert_eq!(report.blobs_written.len(), 1);
        assert_eq!(report.published[0].correlation.lang, "fr");
    }
}
