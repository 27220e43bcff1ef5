//! Blob references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pointer to a binary payload stored out-of-band from messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobRef {
    /// Bucket name.
    pub bucket: String,
    /// Object name within the bucket.
    pub name: String,
}

impl BlobRef {
    /// Creates a new blob reference.
    #[must_use]
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Returns a URI for collaborators that address objects by URI.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("blob://{}/{}", self.bucket, self.name)
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_ref_display_and_uri() {
        let blob = BlobRef::new("audio-out", "photo_fr.mp3");
        assert_eq!(blob.to_string(), "audio-out/photo_fr.mp3");
        assert_eq!(blob.uri(), "blob://audio-out/photo_fr.mp3");
    }
}
