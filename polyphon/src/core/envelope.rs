//! Wire envelope for push-style message delivery.
//!
//! A pushed message arrives as a JSON envelope whose `data` field holds the
//! base64 of the JSON-encoded [`Message`].

use super::Message;
use crate::errors::{MissingFieldError, PipelineError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A message as it travels over a push subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64-encoded JSON payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Transport attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Bus-assigned message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Envelope {
    /// Wraps a message.
    pub fn wrap(message: &Message) -> Result<Self> {
        Ok(Self {
            data: Some(STANDARD.encode(message.to_json_bytes()?)),
            attributes: BTreeMap::new(),
            message_id: None,
        })
    }

    /// Sets the message id.
    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Adds a transport attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Decodes the wrapped message.
    ///
    /// A missing or empty `data` section is a validation error, the same as
    /// any other missing field.
    pub fn decode(&self) -> Result<Message> {
        let data = match self.data.as_deref() {
            Some(data) if !data.is_empty() => data,
            _ => return Err(MissingFieldError::new("data").into()),
        };
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| PipelineError::Serialization(format!("invalid base64 data: {e}")))?;
        Message::from_json_bytes(&bytes)
    }

    /// Parses an envelope from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_then_decode() {
        let message = Message::new()
            .with_field("text", "chat, chien, ")
            .with_field("filename", "photo.jpg")
            .with_field("lang", "fr");

        let envelope = Envelope::wrap(&message).unwrap().with_message_id("42");
        assert_eq!(envelope.decode().unwrap(), message);
        assert_eq!(envelope.message_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_missing_data_is_validation_error() {
        let envelope = Envelope::from_json(r#"{"attributes":{"k":"v"}}"#).unwrap();
        let err = envelope.decode().unwrap_err();

        assert!(matches!(err, PipelineError::Validation(ref e) if e.field == "data"));
    }

    #[test]
    fn test_invalid_base64_is_serialization_error() {
        let envelope = Envelope {
            data: Some("%%%".to_string()),
            ..Envelope::default()
        };
        assert!(matches!(envelope.decode(), Err(PipelineError::Serialization(_))));
    }
}
