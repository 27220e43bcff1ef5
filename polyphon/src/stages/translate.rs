//! Translate stage.

use super::{Stage, StageReport, StageTrigger};
use crate::config::PipelineSettings;
use crate::context::PipelineContext;
use crate::contracts::{LabelsMessage, MessageContract, TranslatedTextMessage};
use crate::core::{CorrelationKey, Message, Topic};
use crate::errors::Result;
use async_trait::async_trait;
use tracing::{debug, info};

/// Translates one branch's label text into its target language.
///
/// When the target equals the source the text passes through untouched
/// and the translator is never called.
#[derive(Debug, Clone)]
pub struct TranslateStage {
    input: Topic,
    output: Topic,
}

impl TranslateStage {
    /// Creates the stage from settings.
    #[must_use]
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            input: settings.topics.labels.clone(),
            output: settings.topics.translated_text.clone(),
        }
    }
}

#[async_trait]
impl Stage for TranslateStage {
    fn name(&self) -> &str {
        "translate"
    }

    fn trigger(&self) -> StageTrigger {
        StageTrigger::topic(self.input.clone())
    }

    fn contract(&self) -> MessageContract {
        LabelsMessage::CONTRACT
    }

    fn correlation(&self, message: &Message) -> Option<CorrelationKey> {
        LabelsMessage::try_from(message).ok().map(|m| m.correlation())
    }

    async fn handle(&self, ctx: &PipelineContext, message: &Message) -> Result<StageReport> {
        let labels = LabelsMessage::try_from(message)?;
        let key = labels.correlation();

        let text = if labels.lang == labels.src_lang {
            debug!(branch = %key, "Source and target match, passing text through");
            labels.text
        } else {
            let translated = ctx
                .translator
                .translate(&labels.text, &labels.src_lang, &labels.lang)
                .await?;
            info!(branch = %key, from = %labels.src_lang, "Text translated");
            translated
        };

        let out = TranslatedTextMessage {
            text,
            filename: labels.filename,
            lang: labels.lang,
        };
        let message_id = ctx.bus.publish(&self.output, out.into_message()).await?;

        Ok(StageReport::new(self.name()).with_published(self.output.clone(), message_id, key))
    }
}
