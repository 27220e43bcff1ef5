//! Testing utilities for polyphon pipelines.
//!
//! This module provides:
//! - Capability doubles with call recording and failure injection
//! - An in-memory pipeline fixture
//! - Assertions on dispatch results

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_acked, assert_fatal, assert_missing_field, assert_nacked, assert_published,
};
pub use fixtures::{FixtureBuilder, PipelineFixture};
pub use mocks::{DictionaryTranslator, StaticLabeler, ToneSynthesizer};
