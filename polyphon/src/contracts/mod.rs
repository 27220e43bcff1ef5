//! Per-topic message contracts.
//!
//! A contract lists the fields a stage needs. The dispatcher checks it
//! before any side-effecting call, so a malformed message never reaches
//! business logic.

mod messages;

pub use messages::{ImageUpload, LabelsMessage, Mp3ReadyMessage, TranslatedTextMessage};

use crate::core::Message;
use crate::errors::MissingFieldError;

/// Required-field contract of a message shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContract {
    name: &'static str,
    required: &'static [&'static str],
}

impl MessageContract {
    /// Creates a contract.
    #[must_use]
    pub const fn new(name: &'static str, required: &'static [&'static str]) -> Self {
        Self { name, required }
    }

    /// Contract name, for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Required fields in check order.
    #[must_use]
    pub fn required(&self) -> &'static [&'static str] {
        self.required
    }

    /// Checks that every required field is present and non-empty.
    ///
    /// Reports the first offending field in declaration order.
    pub fn validate(&self, message: &Message) -> Result<(), MissingFieldError> {
        for field in self.required {
            message.require(field)?;
        }
        Ok(())
    }

    /// Lists every missing or empty field.
    #[must_use]
    pub fn missing_fields(&self, message: &Message) -> Vec<&'static str> {
        self.required
            .iter()
            .copied()
            .filter(|field| message.require(field).is_err())
            .collect()
    }
}
