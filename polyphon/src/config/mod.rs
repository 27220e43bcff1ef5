//! Pipeline configuration: settings document, voice table and retrieval
//! from the configuration bucket.

mod retrieval;
mod settings;
mod voices;

pub use retrieval::{retrieve_configuration, retrieve_configuration_raw, update_configuration};
pub use settings::{BucketNames, PipelineSettings, TopicNames};
pub use voices::{AudioEncoding, VoiceConfig, VoiceGender, VoiceTable};
