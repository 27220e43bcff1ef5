//! Lifecycle event sinks.

use super::types;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives stage lifecycle events such as `stage.started` or `stage.nacked`.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting. Must never fail.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// One lifecycle event with the stage and branch pulled out of its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Event type, one of [`types`].
    pub event_type: String,
    /// Stage that produced it, if the payload names one.
    pub stage: Option<String>,
    /// Branch key `filename#lang`, if the payload carries one.
    pub branch: Option<String>,
    /// Raw payload.
    pub data: Option<Value>,
    /// When the sink received it.
    pub at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Builds a record from an emitted event.
    ///
    /// Dispatcher payloads carry the branch as `correlation`, stage payloads
    /// as `branch`.
    #[must_use]
    pub fn new(event_type: &str, data: Option<Value>) -> Self {
        let field = |name: &str| {
            data.as_ref()
                .and_then(|d| d.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            event_type: event_type.to_string(),
            stage: field("stage"),
            branch: field("correlation").or_else(|| field("branch")),
            data,
            at: Utc::now(),
        }
    }

    /// Returns true for events that mean a delivery failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            types::STAGE_NACKED | types::STAGE_FATAL | types::EVENT_UNROUTABLE
        )
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`.
///
/// Failures (`stage.nacked`, `stage.fatal`, `event.unroutable`) always log
/// at WARN; everything else logs at the sink's level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging routine events at `level`. Anything other
    /// than DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a sink logging routine events at DEBUG.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log(&self, event: &RecordedEvent) {
        let stage = event.stage.as_deref().unwrap_or("-");
        let branch = event.branch.as_deref().unwrap_or("-");

        if event.is_failure() {
            warn!(event_type = %event.event_type, stage, branch, data = ?event.data, "Pipeline event");
        } else if self.level == Level::DEBUG {
            debug!(event_type = %event.event_type, stage, branch, data = ?event.data, "Pipeline event");
        } else {
            info!(event_type = %event.event_type, stage, branch, "Pipeline event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log(&RecordedEvent::new(event_type, data));
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log(&RecordedEvent::new(event_type, data));
    }
}

/// Keeps every event in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Event types only, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops everything collected so far.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<RecordedEvent> {
        self.select(|e| e.event_type.starts_with(type_prefix))
    }

    /// Events reported for one stage.
    #[must_use]
    pub fn for_stage(&self, stage: &str) -> Vec<RecordedEvent> {
        self.select(|e| e.stage.as_deref() == Some(stage))
    }

    /// Events reported for one branch, keyed `filename#lang`.
    #[must_use]
    pub fn for_branch(&self, branch: &str) -> Vec<RecordedEvent> {
        self.select(|e| e.branch.as_deref() == Some(branch))
    }

    /// Failed deliveries seen so far.
    #[must_use]
    pub fn failures(&self) -> Vec<RecordedEvent> {
        self.select(RecordedEvent::is_failure)
    }

    fn select(&self, keep: impl Fn(&RecordedEvent) -> bool) -> Vec<RecordedEvent> {
        self.events.read().iter().filter(|e| keep(e)).cloned().collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.try_emit(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push(RecordedEvent::new(event_type, data));
    }
}
