//! Lifecycle event emission.
//!
//! The dispatcher reports every stage invocation to an [`EventSink`]. The
//! sink is part of [`crate::context::PipelineContext`]; there is no global.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Event type names emitted by the dispatcher and stages.
pub mod types {
    /// A handler is about to run.
    pub const STAGE_STARTED: &str = "stage.started";
    /// The invocation ended as `Ack`.
    pub const STAGE_ACKED: &str = "stage.acked";
    /// The invocation ended as `Nack`.
    pub const STAGE_NACKED: &str = "stage.nacked";
    /// The invocation ended as `Fatal`.
    pub const STAGE_FATAL: &str = "stage.fatal";
    /// No stage matched the event.
    pub const EVENT_UNROUTABLE: &str = "event.unroutable";
    /// One branch reached the audio sink.
    pub const BRANCH_DELIVERED: &str = "branch.delivered";
    /// Every configured branch of a request reached the audio sink.
    pub const REQUEST_COMPLETED: &str = "request.completed";
}
