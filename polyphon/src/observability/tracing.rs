//! `tracing` subscriber setup and per-invocation span data.

use crate::core::{CorrelationKey, Outcome};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// Returns false if a subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

/// Attributes of one stage invocation, attached to lifecycle events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage: String,
    /// Trigger the stage listens on, as `blob:<bucket>` or `topic:<name>`.
    pub trigger: String,
    /// Branch key `filename#lang`, when the message carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    /// How the invocation ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Handler wall time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Structured error payload for `Nack` and `Fatal`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    /// Messages published downstream on `Ack`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<usize>,
}

impl StageSpanAttributes {
    /// Creates attributes for a stage and its trigger.
    #[must_use]
    pub fn new(stage: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            trigger: trigger.into(),
            ..Self::default()
        }
    }

    /// Sets the branch correlation key.
    #[must_use]
    pub fn with_correlation(mut self, key: Option<&CorrelationKey>) -> Self {
        self.correlation = key.map(ToString::to_string);
        self
    }

    /// Records how the invocation ended.
    #[must_use]
    pub fn finished(mut self, outcome: Outcome, duration_ms: f64) -> Self {
        self.outcome = Some(outcome);
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attaches an error payload.
    #[must_use]
    pub fn with_error(mut self, error: serde_json::Value) -> Self {
        self.error = Some(error);
        self
    }

    /// Records the number of downstream publishes.
    #[must_use]
    pub fn with_published(mut self, count: usize) -> Self {
        self.published = Some(count);
        self
    }

    /// Converts to an event payload.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Measures wall time of a stage invocation.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Elapsed milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// The timed span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_payload() {
        let key = CorrelationKey::new("photo.jpg", "fr");
        let attrs = StageSpanAttributes::new("synthesize", "translated-text-topic")
            .with_correlation(Some(&key))
            .with_published(1)
            .finished(Outcome::Ack, 12.5);

        let value = attrs.to_value();
        assert_eq!(value["stage"], "synthesize");
        assert_eq!(value["correlation"], "photo.jpg#fr");
        assert_eq!(value["outcome"], "ack");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("label");
        assert_eq!(timer.name(), "label");
        assert!(timer.elapsed_ms() >= 0.0);
    }

    #[test]
    fn test_init_tracing_twice() {
        let _ = init_tracing(LogFormat::Pretty);
        assert!(!init_tracing(LogFormat::Json));
    }
}
