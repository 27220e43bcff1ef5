//! Core domain model types for polyphon.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Events that trigger stages and the outcomes they end in
//! - Messages, their wire envelope and the topics they travel on
//! - Blob references and branch correlation keys

mod blob;
mod correlation;
mod envelope;
mod event;
mod message;
mod outcome;
mod topic;

pub use blob::BlobRef;
pub use correlation::{BranchProgress, BranchTracker, CorrelationKey};
pub use envelope::Envelope;
pub use event::Event;
pub use message::Message;
pub use outcome::Outcome;
pub use topic::{Topic, LABELS_TOPIC, MP3_READY_TOPIC, TRANSLATED_TEXT_TOPIC};
