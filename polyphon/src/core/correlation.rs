//! Branch correlation across a fan-out.
//!
//! The bus has no notion of correlation. A branch is identified by the
//! original filename plus the target language, and every downstream message
//! carries both verbatim.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifies one fan-out branch: `(filename, target language)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationKey {
    /// Original filename or request id.
    pub filename: String,
    /// Target language of the branch.
    pub lang: String,
}

impl CorrelationKey {
    /// Creates a new correlation key.
    #[must_use]
    pub fn new(filename: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            lang: lang.into(),
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.filename, self.lang)
    }
}

/// Delivery progress of one request across its branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchProgress {
    /// The request.
    pub filename: String,
    /// Languages delivered so far.
    pub delivered: BTreeSet<String>,
    /// Languages still outstanding.
    pub outstanding: BTreeSet<String>,
}

impl BranchProgress {
    /// Returns true once every expected branch has been delivered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outstanding.is_empty()
    }
}

/// Observational fan-in: counts delivered branches per request.
///
/// The tracker never gates anything. Redelivered branches are absorbed
/// because languages are kept as a set. A request is dropped as soon as it
/// completes, so uploading the same filename again starts from zero.
#[derive(Debug, Default)]
pub struct BranchTracker {
    expected: BTreeSet<String>,
    delivered: DashMap<String, BTreeSet<String>>,
}

impl BranchTracker {
    /// Creates a tracker expecting the given languages per request.
    #[must_use]
    pub fn new<I, S>(expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: expected.into_iter().map(Into::into).collect(),
            delivered: DashMap::new(),
        }
    }

    /// Records a delivered branch and returns the request's progress.
    ///
    /// Once the request is complete it is no longer tracked.
    pub fn record(&self, key: &CorrelationKey) -> BranchProgress {
        let progress = {
            let mut entry = self.delivered.entry(key.filename.clone()).or_default();
            entry.insert(key.lang.clone());
            self.build_progress(&key.filename, &entry)
        };
        if progress.is_complete() {
            self.delivered.remove(&key.filename);
        }
        progress
    }

    /// Returns progress for a request still in flight.
    #[must_use]
    pub fn progress(&self, filename: &str) -> Option<BranchProgress> {
        self.delivered
            .get(filename)
            .map(|entry| self.build_progress(filename, &entry))
    }

    /// Stops tracking a request.
    pub fn forget(&self, filename: &str) -> bool {
        self.delivered.remove(filename).is_some()
    }

    /// Returns the number of tracked requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delivered.len()
    }

    /// Returns true if no request is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }

    fn build_progress(&self, filename: &str, delivered: &BTreeSet<String>) -> BranchProgress {
        BranchProgress {
            filename: filename.to_string(),
            delivered: delivered.clone(),
            outstanding: self.expected.difference(delivered).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_key_display() {
        assert_eq!(CorrelationKey::new("photo.jpg", "fr").to_string(), "photo.jpg#fr");
    }

    #[test]
    fn test_tracker_completes_in_any_order() {
        let tracker = BranchTracker::new(["en", "fr"]);

        let progress = tracker.record(&CorrelationKey::new("photo.jpg", "fr"));
        assert!(!progress.is_complete());
        assert!(progress.outstanding.contains("en"));

        let progress = tracker.record(&CorrelationKey::new("photo.jpg", "en"));
        assert!(progress.is_complete());
    }

    #[test]
    fn test_tracker_absorbs_duplicates() {
        let tracker = BranchTracker::new(["en", "fr"]);
        tracker.record(&CorrelationKey::new("a.jpg", "en"));
        let progress = tracker.record(&CorrelationKey::new("a.jpg", "en"));

        assert_eq!(progress.delivered.len(), 1);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_tracker_keeps_requests_apart() {
        let tracker = BranchTracker::new(["en", "fr"]);
        tracker.record(&CorrelationKey::new("a.jpg", "en"));

        assert!(!tracker.progress("a.jpg").unwrap().is_complete());
        assert!(tracker.progress("b.jpg").is_none());
        assert!(tracker.forget("a.jpg"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_completed_request_is_released() {
        let tracker = BranchTracker::new(["en", "fr"]);
        tracker.record(&CorrelationKey::new("in_photo.jpg", "en"));
        assert!(tracker.record(&CorrelationKey::new("in_photo.jpg", "fr")).is_complete());

        assert!(tracker.is_empty());
        assert!(tracker.progress("in_photo.jpg").is_none());
    }

    #[test]
    fn test_reused_filename_starts_a_new_request() {
        let tracker = BranchTracker::new(["en", "fr"]);
        tracker.record(&CorrelationKey::new("in_photo.jpg", "en"));
        tracker.record(&CorrelationKey::new("in_photo.jpg", "fr"));

        let progress = tracker.record(&CorrelationKey::new("in_photo.jpg", "en"));
        assert!(!progress.is_complete());
        assert_eq!(progress.delivered.len(), 1);
        assert!(progress.outstanding.contains("fr"));
    }
}
