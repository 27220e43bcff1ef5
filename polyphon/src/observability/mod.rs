//! Logging setup and stage span helpers.

mod tracing;

pub use self::tracing::{init_tracing, LogFormat, SpanTimer, StageSpanAttributes};
