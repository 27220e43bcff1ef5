//! Delivery outcome of a stage invocation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the bus should do with the event that triggered a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Processed; remove the event.
    Ack,
    /// Failed transiently; keep the event for redelivery.
    Nack,
    /// Failed for good; drop the event without retrying.
    Fatal,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::Nack => write!(f, "nack"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

impl Outcome {
    /// Returns true for `Ack`.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    /// Returns true if the event should be redelivered.
    #[must_use]
    pub fn wants_redelivery(&self) -> bool {
        matches!(self, Self::Nack)
    }

    /// Returns true if the event leaves the bus, either processed or dropped.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ack | Self::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Ack.to_string(), "ack");
        assert_eq!(Outcome::Nack.to_string(), "nack");
        assert_eq!(Outcome::Fatal.to_string(), "fatal");
    }

    #[test]
    fn test_outcome_terminal() {
        assert!(Outcome::Ack.is_terminal());
        assert!(Outcome::Fatal.is_terminal());
        assert!(!Outcome::Nack.is_terminal());
        assert!(Outcome::Nack.wants_redelivery());
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_string(&Outcome::Fatal).unwrap();
        assert_eq!(json, r#""fatal""#);
    }
}
