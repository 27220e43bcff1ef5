//! Stage trigger events.

use super::{BlobRef, Message, Topic};
use serde::{Deserialize, Serialize};

/// The trigger for a stage invocation. Immutable once delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// An object was written to a bucket.
    BlobWritten {
        /// Bucket name.
        bucket: String,
        /// Object name.
        name: String,
    },
    /// A message arrived on a topic.
    BusMessage {
        /// The topic it arrived on.
        topic: Topic,
        /// The message body.
        payload: Message,
    },
}

impl Event {
    /// Creates a blob write event.
    #[must_use]
    pub fn blob_written(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self::BlobWritten {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Creates a bus message event.
    #[must_use]
    pub fn bus_message(topic: impl Into<Topic>, payload: Message) -> Self {
        Self::BusMessage {
            topic: topic.into(),
            payload,
        }
    }

    /// Short name of the variant, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlobWritten { .. } => "blob_written",
            Self::BusMessage { .. } => "bus_message",
        }
    }

    /// The topic for bus messages.
    #[must_use]
    pub fn topic(&self) -> Option<&Topic> {
        match self {
            Self::BusMessage { topic, .. } => Some(topic),
            Self::BlobWritten { .. } => None,
        }
    }

    /// The written blob for blob events.
    #[must_use]
    pub fn blob(&self) -> Option<BlobRef> {
        match self {
            Self::BlobWritten { bucket, name } => Some(BlobRef::new(bucket.clone(), name.clone())),
            Self::BusMessage { .. } => None,
        }
    }

    /// The event as a flat message, the shape stage contracts validate.
    ///
    /// Blob events become `{bucket, name}`.
    #[must_use]
    pub fn to_message(&self) -> Message {
        match self {
            Self::BlobWritten { bucket, name } => Message::new()
                .with_field("bucket", bucket.clone())
                .with_field("name", name.clone()),
            Self::BusMessage { payload, .. } => payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_event_as_message() {
        let event = Event::blob_written("photos-in", "photo.jpg");
        let message = event.to_message();

        assert_eq!(event.kind(), "blob_written");
        assert!(event.topic().is_none());
        assert_eq!(message.get("bucket"), Some("photos-in"));
        assert_eq!(message.get("name"), Some("photo.jpg"));
        assert_eq!(event.blob(), Some(BlobRef::new("photos-in", "photo.jpg")));
    }

    #[test]
    fn test_bus_event() {
        let payload = Message::new().with_field("lang", "fr");
        let event = Event::bus_message("labels-topic", payload.clone());

        assert_eq!(event.topic().map(Topic::as_str), Some("labels-topic"));
        assert_eq!(event.to_message(), payload);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::blob_written("b", "n");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "blob_written");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
