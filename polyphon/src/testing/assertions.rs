//! Assertions on dispatch results.

use crate::core::Outcome;
use crate::dispatch::DispatchResult;
use crate::errors::PipelineError;

/// Asserts that the dispatch ended as `Ack`.
pub fn assert_acked(result: &DispatchResult) {
    assert_eq!(
        result.outcome,
        Outcome::Ack,
        "Expected ack from {:?}, got {:?} ({:?})",
        result.stage,
        result.outcome,
        result.error
    );
}

/// Asserts that the dispatch ended as `Nack`.
pub fn assert_nacked(result: &DispatchResult) {
    assert_eq!(
        result.outcome,
        Outcome::Nack,
        "Expected nack from {:?}, got {:?} ({:?})",
        result.stage,
        result.outcome,
        result.error
    );
}

/// Asserts that the dispatch ended as `Fatal`.
pub fn assert_fatal(result: &DispatchResult) {
    assert_eq!(
        result.outcome,
        Outcome::Fatal,
        "Expected fatal from {:?}, got {:?}",
        result.stage,
        result.outcome
    );
}

/// Asserts that the dispatch failed validation on `field`.
pub fn assert_missing_field(result: &DispatchResult, field: &str) {
    assert_fatal(result);
    match &result.error {
        Some(PipelineError::Validation(missing)) => assert_eq!(
            missing.field, field,
            "Expected missing field '{}', got '{}'",
            field, missing.field
        ),
        other => panic!("Expected validation error on '{field}', got {other:?}"),
    }
}

/// Asserts that the dispatch published exactly `count` messages.
pub fn assert_published(result: &DispatchResult, count: usize) {
    assert_eq!(
        result.published(),
        count,
        "Expected {} publishes, got {}",
        count,
        result.published()
    );
}
