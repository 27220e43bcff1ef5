//! Delivery stage.

use super::{AudioSink, DeliveredAudio, Stage, StageReport, StageTrigger};
use crate::config::PipelineSettings;
use crate::context::PipelineContext;
use crate::contracts::{MessageContract, Mp3ReadyMessage};
use crate::core::{BranchTracker, CorrelationKey, Message, Topic};
use crate::errors::Result;
use crate::events::types;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Fetches finished audio and hands it to an [`AudioSink`]. Never publishes.
pub struct DeliverStage {
    input: Topic,
    sink: Arc<dyn AudioSink>,
    tracker: BranchTracker,
}

impl DeliverStage {
    /// Creates the stage from settings.
    ///
    /// The tracker expects one branch per configured target language.
    #[must_use]
    pub fn new(settings: &PipelineSettings, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            input: settings.topics.mp3_ready.clone(),
            sink,
            tracker: BranchTracker::new(settings.target_languages.iter().cloned()),
        }
    }

    /// Branch progress per request.
    #[must_use]
    pub fn tracker(&self) -> &BranchTracker {
        &self.tracker
    }
}

impl std::fmt::Debug for DeliverStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverStage")
            .field("input", &self.input)
            .field("tracked", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for DeliverStage {
    fn name(&self) -> &str {
        "deliver"
    }

    fn trigger(&self) -> StageTrigger {
        StageTrigger::topic(self.input.clone())
    }

    fn contract(&self) -> MessageContract {
        Mp3ReadyMessage::CONTRACT
    }

    fn correlation(&self, message: &Message) -> Option<CorrelationKey> {
        Mp3ReadyMessage::try_from(message).ok().map(|m| m.correlation())
    }

    async fn handle(&self, ctx: &PipelineContext, message: &Message) -> Result<StageReport> {
        let ready = Mp3ReadyMessage::try_from(message)?;
        let key = ready.correlation();

        let audio = ctx.store.download(&ready.blob()).await?;
        self.sink
            .deliver(DeliveredAudio {
                correlation: key.clone(),
                name: ready.mp3_filename.clone(),
                audio,
            })
            .await?;

        let progress = self.tracker.record(&key);
        ctx.events
            .emit(
                types::BRANCH_DELIVERED,
                Some(json!({"branch": key.to_string(), "blob": ready.blob().to_string()})),
            )
            .await;
        info!(branch = %key, blob = %ready.blob(), "Audio delivered");

        if progress.is_complete() {
            info!(
                filename = %progress.filename,
                languages = ?progress.delivered,
                "Every branch delivered"
            );
            ctx.events
                .emit(
                    types::REQUEST_COMPLETED,
                    Some(json!({"filename": progress.filename, "languages": progress.delivered})),
                )
                .await;
        }

        Ok(StageReport::new(self.name()))
    }
}
