//! Stage dispatch.
//!
//! The dispatcher is the only place where errors become delivery outcomes.
//! It picks the stage for an event, checks the stage's contract, runs the
//! handler under a timeout and reports the result. Nothing it calls can make
//! it fail: every path ends in an [`Outcome`].

use crate::context::PipelineContext;
use crate::core::{CorrelationKey, Event, Message, Outcome, Topic};
use crate::errors::{ConfigurationError, PipelineError, Result, TransientCapabilityError};
use crate::events::types;
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::stages::{
    AudioSink, DeliverStage, LabelStage, Stage, StageReport, StageTrigger, SynthesizeStage,
    TranslateStage,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

/// Result of dispatching one event.
#[derive(Debug)]
pub struct DispatchResult {
    /// The stage that ran, `None` if the event was unroutable.
    pub stage: Option<String>,
    /// Delivery outcome.
    pub outcome: Outcome,
    /// Side effects on success.
    pub report: Option<StageReport>,
    /// The failure, for `Nack` and `Fatal`.
    pub error: Option<PipelineError>,
}

impl DispatchResult {
    fn unroutable() -> Self {
        Self {
            stage: None,
            outcome: Outcome::Fatal,
            report: None,
            error: None,
        }
    }

    /// Number of messages published downstream.
    #[must_use]
    pub fn published(&self) -> usize {
        self.report.as_ref().map_or(0, |r| r.published.len())
    }
}

/// Routes events to stages and maps results to outcomes.
pub struct Dispatcher {
    ctx: Arc<PipelineContext>,
    stages: Vec<Arc<dyn Stage>>,
    timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher using the settings' stage timeout.
    #[must_use]
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let timeout = ctx.settings().stage_timeout();
        Self {
            ctx,
            stages: Vec::new(),
            timeout,
        }
    }

    /// Wires Label, Translate, Synthesize and Deliver from the context's settings.
    pub fn standard(ctx: Arc<PipelineContext>, sink: Arc<dyn AudioSink>) -> Result<Self> {
        let settings = ctx.settings.clone();
        let mut dispatcher = Self::new(ctx);
        dispatcher.register(Arc::new(LabelStage::new(&settings)))?;
        dispatcher.register(Arc::new(TranslateStage::new(&settings)))?;
        dispatcher.register(Arc::new(SynthesizeStage::new(&settings)))?;
        dispatcher.register(Arc::new(DeliverStage::new(&settings, sink)))?;
        Ok(dispatcher)
    }

    /// Overrides the handler timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a stage. Two stages may not share a trigger.
    pub fn register(&mut self, stage: Arc<dyn Stage>) -> Result<()> {
        let trigger = stage.trigger();
        if let Some(existing) = self.stages.iter().find(|s| s.trigger() == trigger) {
            return Err(ConfigurationError::new(format!(
                "stages '{}' and '{}' both trigger on {trigger}",
                existing.name(),
                stage.name()
            ))
            .into());
        }
        self.stages.push(stage);
        Ok(())
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Registered stages in registration order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// The handler timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The stage whose trigger matches `event`.
    #[must_use]
    pub fn route(&self, event: &Event) -> Option<&Arc<dyn Stage>> {
        self.stages.iter().find(|s| s.trigger().matches(event))
    }

    /// `(stage name, topic)` for every topic-triggered stage.
    #[must_use]
    pub fn topics(&self) -> Vec<(String, Topic)> {
        self.stages
            .iter()
            .filter_map(|s| match s.trigger() {
                StageTrigger::Topic { topic } => Some((s.name().to_string(), topic)),
                StageTrigger::BlobWritten { .. } => None,
            })
            .collect()
    }

    /// Dispatches an event and returns its outcome.
    pub async fn dispatch(&self, event: &Event) -> Outcome {
        self.dispatch_detailed(event).await.outcome
    }

    /// Dispatches an event and returns the full result.
    pub async fn dispatch_detailed(&self, event: &Event) -> DispatchResult {
        let Some(stage) = self.route(event) else {
            warn!(kind = event.kind(), topic = ?event.topic(), "No stage for event, dropping");
            self.ctx
                .events
                .emit(types::EVENT_UNROUTABLE, Some(json!({ "event": event })))
                .await;
            return DispatchResult::unroutable();
        };

        let message = event.to_message();
        let correlation = stage.correlation(&message);
        let span = info_span!(
            "stage",
            stage = stage.name(),
            branch = %correlation.as_ref().map(ToString::to_string).unwrap_or_default(),
        );

        self.run(stage.as_ref(), &message, correlation.as_ref())
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        stage: &dyn Stage,
        message: &Message,
        correlation: Option<&CorrelationKey>,
    ) -> DispatchResult {
        let trigger = stage.trigger();
        let timer = SpanTimer::start(stage.name());
        let attrs = StageSpanAttributes::new(stage.name(), trigger.to_string())
            .with_correlation(correlation);

        self.ctx
            .events
            .emit(types::STAGE_STARTED, Some(attrs.to_value()))
            .await;

        let result = match stage.contract().validate(message) {
            Err(missing) => {
                let missing = match trigger.as_topic() {
                    Some(topic) => missing.with_topic(topic.as_str()),
                    None => missing,
                };
                Err(PipelineError::from(missing))
            }
            Ok(()) => match tokio::time::timeout(self.timeout, stage.handle(&self.ctx, message)).await {
                Ok(result) => result,
                Err(_) => Err(TransientCapabilityError::new(
                    stage.name(),
                    format!("handler timed out after {:?}", self.timeout),
                )
                .into()),
            },
        };

        let duration_ms = timer.elapsed_ms();
        match result {
            Ok(report) => {
                info!(published = report.published.len(), duration_ms, "Stage acked");
                let attrs = attrs
                    .with_published(report.published.len())
                    .finished(Outcome::Ack, duration_ms);
                self.ctx.events.emit(types::STAGE_ACKED, Some(attrs.to_value())).await;

                DispatchResult {
                    stage: Some(stage.name().to_string()),
                    outcome: Outcome::Ack,
                    report: Some(report),
                    error: None,
                }
            }
            Err(err) => {
                let outcome = err.outcome();
                let event_type = if outcome == Outcome::Nack {
                    warn!(kind = err.kind(), error = %err, duration_ms, "Stage failed, will be redelivered");
                    types::STAGE_NACKED
                } else {
                    match &err {
                        PipelineError::Validation(missing) => {
                            error!(field = %missing.field, error = %err, "Message rejected");
                        }
                        _ => error!(kind = err.kind(), error = %err, "Stage failed permanently"),
                    }
                    types::STAGE_FATAL
                };

                let attrs = attrs
                    .with_error(json!(err.to_dict()))
                    .finished(outcome, duration_ms);
                self.ctx.events.emit(event_type, Some(attrs.to_value())).await;

                DispatchResult {
                    stage: Some(stage.name().to_string()),
                    outcome,
                    report: None,
                    error: Some(err),
                }
            }
        }
    }
}
