//! Loading settings from the configuration bucket.

use super::PipelineSettings;
use crate::core::BlobRef;
use crate::errors::{PipelineError, Result};
use crate::storage::BlobStore;
use tracing::info;

/// Downloads the raw settings document named by `settings`.
pub async fn retrieve_configuration_raw(
    store: &dyn BlobStore,
    settings: &PipelineSettings,
) -> Result<String> {
    let blob = BlobRef::new(
        settings.buckets.configuration.clone(),
        settings.configuration_object.clone(),
    );
    let bytes = store.download(&blob).await?;
    String::from_utf8(bytes)
        .map_err(|e| PipelineError::Serialization(format!("settings document is not UTF-8: {e}")))
}

/// Downloads, parses and validates the settings document from the
/// configuration bucket.
///
/// `settings` only supplies where to look; the returned settings come
/// entirely from the document, with defaults for omitted keys.
pub async fn retrieve_configuration(
    store: &dyn BlobStore,
    settings: &PipelineSettings,
) -> Result<PipelineSettings> {
    let json = retrieve_configuration_raw(store, settings).await?;
    let loaded = PipelineSettings::from_json_str(&json)?;
    info!(
        bucket = %settings.buckets.configuration,
        object = %settings.configuration_object,
        languages = ?loaded.target_languages,
        "Configuration retrieved"
    );
    Ok(loaded)
}

/// Writing settings back is not offered; the configuration bucket is
/// read-only to the pipeline.
pub async fn update_configuration(
    _store: &dyn BlobStore,
    _settings: &PipelineSettings,
    _document: &str,
) -> Result<()> {
    Err(PipelineError::Unsupported(
        "update_configuration: the configuration bucket is read-only".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBlobStore;

    #[tokio::test]
    async fn test_retrieve_configuration() {
        let store = InMemoryBlobStore::new();
        let defaults = PipelineSettings::default();
        store
            .upload(
                &BlobRef::new("pipeline-settings", "pipeline-settings.json"),
                br#"{"target_languages": ["en", "fr", "de"]}"#.to_vec(),
            )
            .await
            .unwrap();

        let loaded = retrieve_configuration(&store, &defaults).await.unwrap();
        assert_eq!(loaded.target_languages, vec!["en", "fr", "de"]);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let store = InMemoryBlobStore::new();
        let err = retrieve_configuration(&store, &PipelineSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_document_rejected() {
        let store = InMemoryBlobStore::new();
        store
            .upload(
                &BlobRef::new("pipeline-settings", "pipeline-settings.json"),
                br#"{"target_languages": []}"#.to_vec(),
            )
            .await
            .unwrap();

        let err = retrieve_configuration(&store, &PipelineSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_update_is_unsupported() {
        let store = InMemoryBlobStore::new();
        let err = update_configuration(&store, &PipelineSettings::default(), "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unsupported(_)));
        assert!(store.is_empty());
    }
}
