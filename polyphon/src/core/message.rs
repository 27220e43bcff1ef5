//! Bus message payloads.

use crate::errors::{MissingFieldError, PipelineError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A flat mapping of field names to string values.
///
/// Messages are transient: they carry just enough to reconstruct the
/// request identity plus whatever the next stage needs. Binary payloads
/// never travel inside a message, only blob references do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: BTreeMap<String, String>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any previous value.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    /// Gets a field value, empty or not.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Gets a field that must be present and non-empty.
    pub fn require(&self, key: &str) -> std::result::Result<&str, MissingFieldError> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(MissingFieldError::new(key)),
        }
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the message has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serializes to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }

    /// Parses a JSON object.
    ///
    /// String values are taken as-is. Numbers and booleans are rendered to
    /// their JSON text. Nulls are dropped so that contract validation reports
    /// them as missing instead of seeing the string `"null"`.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let serde_json::Value::Object(map) = value else {
            return Err(PipelineError::Serialization(
                "message payload must be a JSON object".to_string(),
            ));
        };

        let mut message = Self::new();
        for (key, value) in map {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => message.insert(key, s),
                serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
                    message.insert(key, value.to_string());
                }
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                    return Err(PipelineError::Serialization(format!(
                        "field '{key}' must be a primitive value"
                    )));
                }
            }
        }
        Ok(message)
    }

    /// Stable content hash of this message on a topic.
    ///
    /// Fields are kept in key order, so two messages with the same fields
    /// always hash the same.
    #[must_use]
    pub fn fingerprint(&self, topic: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(topic.as_bytes());
        hasher.update([0u8]);
        for (key, value) in &self.fields {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

impl<K, V> FromIterator<(K, V)> for Message
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_present_and_non_empty() {
        let message = Message::new()
            .with_field("text", "cat, ")
            .with_field("lang", "");

        assert_eq!(message.require("text").unwrap(), "cat, ");
        assert_eq!(message.require("lang").unwrap_err().field, "lang");
        assert_eq!(message.require("filename").unwrap_err().field, "filename");
    }

    #[test]
    fn test_from_json_primitives() {
        let message =
            Message::from_json_bytes(br#"{"text":"hi","count":3,"flag":true,"gone":null}"#).unwrap();

        assert_eq!(message.get("text"), Some("hi"));
        assert_eq!(message.get("count"), Some("3"));
        assert_eq!(message.get("flag"), Some("true"));
        assert!(!message.contains("gone"));
    }

    #[test]
    fn test_from_json_rejects_nested_and_non_objects() {
        assert!(Message::from_json_bytes(br#"{"a":{"b":1}}"#).is_err());
        assert!(Message::from_json_bytes(br#"["a"]"#).is_err());
        assert!(Message::from_json_bytes(b"not json").is_err());
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = Message::new().with_field("a", "1").with_field("b", "2");
        let b = Message::new().with_field("b", "2").with_field("a", "1");

        assert_eq!(a.fingerprint("t"), b.fingerprint("t"));
        assert_ne!(a.fingerprint("t"), a.fingerprint("other"));
        assert_eq!(a.fingerprint("t").len(), 64);
    }

    #[test]
    fn test_from_iterator() {
        let message: Message = [("filename", "photo.jpg"), ("lang", "fr")].into_iter().collect();
        assert_eq!(message.len(), 2);
        assert_eq!(message.get("lang"), Some("fr"));
    }
}
