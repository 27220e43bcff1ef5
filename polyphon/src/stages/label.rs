//! Label stage: image in, one `Labels` message per target language out.

use super::{Stage, StageReport, StageTrigger};
use crate::capabilities::LabelAnnotation;
use crate::config::PipelineSettings;
use crate::context::PipelineContext;
use crate::contracts::{ImageUpload, LabelsMessage, MessageContract};
use crate::core::{Message, Topic};
use crate::errors::{PartialFanOutFailure, PipelineError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

/// Joins annotation descriptions, each followed by `", "`.
///
/// Falls back to `placeholder` when there are no annotations.
#[must_use]
pub fn describe_labels(annotations: &[LabelAnnotation], placeholder: &str) -> String {
    if annotations.is_empty() {
        return placeholder.to_string();
    }
    annotations.iter().fold(String::new(), |mut text, annotation| {
        text.push_str(&annotation.description);
        text.push_str(", ");
        text
    })
}

/// Labels an uploaded image and fans out one branch per target language.
#[derive(Debug, Clone)]
pub struct LabelStage {
    input_bucket: String,
    output: Topic,
}

impl LabelStage {
    /// Creates the stage from settings.
    #[must_use]
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            input_bucket: settings.buckets.input.clone(),
            output: settings.topics.labels.clone(),
        }
    }
}

#[async_trait]
impl Stage for LabelStage {
    fn name(&self) -> &str {
        "label"
    }

    fn trigger(&self) -> StageTrigger {
        StageTrigger::blob_written(self.input_bucket.clone())
    }

    fn contract(&self) -> MessageContract {
        ImageUpload::CONTRACT
    }

    async fn handle(&self, ctx: &PipelineContext, message: &Message) -> Result<StageReport> {
        let upload = ImageUpload::try_from(message)?;
        let settings = ctx.settings();

        let annotations = ctx.labeler.detect_labels(&upload.blob()).await?;
        let text = describe_labels(&annotations, &settings.empty_labels_text);
        info!(image = %upload.blob(), labels = annotations.len(), text = %text, "Labels extracted");

        let branches: Vec<LabelsMessage> = settings
            .target_languages
            .iter()
            .map(|lang| LabelsMessage {
                text: text.clone(),
                filename: upload.name.clone(),
                lang: lang.clone(),
                src_lang: settings.source_language.clone(),
            })
            .collect();

        let publishes = branches.into_iter().map(|branch| async move {
            let key = branch.correlation();
            let result = ctx.bus.publish(&self.output, branch.into_message()).await;
            (key, result)
        });
        let results = join_all(publishes).await;

        let attempted = results.len();
        let mut report = StageReport::new(self.name());
        let mut failures = Vec::new();
        let mut first_error: Option<PipelineError> = None;

        for (key, result) in results {
            match result {
                Ok(message_id) => {
                    report = report.with_published(self.output.clone(), message_id, key);
                }
                Err(e) => {
                    warn!(branch = %key, error = %e, "Fan-out publish failed");
                    failures.push(format!("{}: {e}", key.lang));
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            None => Ok(report),
            Some(e) if failures.len() == attempted => Err(e),
            Some(_) => Err(PartialFanOutFailure::new(self.name(), attempted, failures).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_labels_joins_with_trailing_separator() {
        let labels = vec![LabelAnnotation::new("cat"), LabelAnnotation::new("dog")];
        assert_eq!(describe_labels(&labels, "nothing"), "cat, dog, ");
    }

    #[test]
    fn test_describe_labels_placeholder() {
        assert_eq!(
            describe_labels(&[], "did not see anything, sorry"),
            "did not see anything, sorry"
        );
    }

    #[test]
    fn test_trigger_and_contract() {
        let stage = LabelStage::new(&PipelineSettings::default());
        assert_eq!(stage.trigger(), StageTrigger::blob_written("photos-in"));
        assert_eq!(stage.contract().required(), &["bucket", "name"]);
    }
}
