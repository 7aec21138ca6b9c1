//! Processed-document JSON in the processed bucket

use chrono::Utc;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::processed_key;
use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::ProcessedDocument;
use crate::payload::ProcessedLocation;
use crate::storage::BlobStore;

/// On-disk shape: the document plus when it was processed
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument<'a> {
    #[serde(flatten)]
    document: &'a ProcessedDocument,
    processing_timestamp: String,
}

/// Write `document` as JSON to `processed_bucket` under the original key
/// with its extension swapped for `.json`.
///
/// # Errors
/// - `InvalidInput` when the document has no original key (nothing is written)
/// - `MissingConfiguration` when no processed bucket is configured
/// - Blob store errors from the write
pub async fn save_processed_document(
    blobs: &dyn BlobStore,
    processed_bucket: &str,
    document: &ProcessedDocument,
) -> Result<ProcessedLocation> {
    if document.original_key.trim().is_empty() {
        return Err(DocRagError::InvalidInput(
            "Processed document needs an original key".to_string(),
        ));
    }
    if processed_bucket.trim().is_empty() {
        return Err(DocRagError::MissingConfiguration(
            "storage.processed_bucket is required to save processed documents".to_string(),
        ));
    }

    let key = processed_key(&document.original_key);
    let stored = StoredDocument {
        document,
        processing_timestamp: Utc::now().to_rfc3339(),
    };
    let body = serde_json::to_vec_pretty(&stored)?;
    let size = body.len();

    blobs
        .put_object(processed_bucket, &key, body, "application/json")
        .await?;
    info!(
        "💾 Saved processed document {} ({} bytes) to s3://{}/{}",
        document.document_id, size, processed_bucket, key
    );

    Ok(ProcessedLocation {
        processed_bucket: processed_bucket.to_string(),
        processed_key: key,
        document_id: document.document_id.clone(),
        metadata_id: None,
    })
}

/// Read a processed document back from its location
pub async fn load_processed_document(
    blobs: &dyn BlobStore,
    location: &ProcessedLocation,
) -> Result<ProcessedDocument> {
    let body = blobs
        .get_object(&location.processed_bucket, &location.processed_key)
        .await?;
    let mut document: ProcessedDocument = serde_json::from_slice(&body)?;
    if document.document_id.trim().is_empty() {
        document.document_id = location.document_id.clone();
    }
    debug!(
        "Loaded processed document {} from s3://{}/{}",
        document.document_id, location.processed_bucket, location.processed_key
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::models::DocumentContent;
    use crate::models::DocumentMetadata;
    use crate::storage::MemoryBlobStore;

    fn document(original_key: &str) -> ProcessedDocument {
        ProcessedDocument {
            document_id: "document".to_string(),
            original_bucket: "test-bucket".to_string(),
            original_key: original_key.to_string(),
            document_content: DocumentContent {
                document_type: ".pdf".to_string(),
                text_content: "Sample text content".to_string(),
                ..DocumentContent::default()
            },
            metadata: DocumentMetadata {
                title: "Test Document".to_string(),
                summary: "This is a test document".to_string(),
                topics: vec!["test".to_string(), "document".to_string()],
                ..DocumentMetadata::default()
            },
            qa_pairs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_save_writes_json_next_to_original_key() {
        let blobs = Arc::new(MemoryBlobStore::default());
        let location = save_processed_document(
            blobs.as_ref(),
            "test-processed-bucket",
            &document("path/to/document.pdf"),
        )
        .await
        .unwrap();

        assert_eq!(location.processed_key, "path/to/document.json");
        assert_eq!(location.processed_bucket, "test-processed-bucket");
        assert_eq!(blobs.len(), 1);
        assert_eq!(
            blobs
                .content_type("test-processed-bucket", "path/to/document.json")
                .as_deref(),
            Some("application/json")
        );

        let body = blobs
            .get_object("test-processed-bucket", "path/to/document.json")
            .await
            .unwrap();
        let saved: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(saved["documentId"], "document");
        assert_eq!(saved["originalBucket"], "test-bucket");
        assert_eq!(saved["originalKey"], "path/to/document.pdf");
        assert_eq!(saved["documentContent"]["textContent"], "Sample text content");
        assert_eq!(saved["metadata"]["title"], "Test Document");
        assert!(saved["processingTimestamp"].is_string());

        let loaded = load_processed_document(blobs.as_ref(), &location).await.unwrap();
        assert_eq!(loaded, document("path/to/document.pdf"));
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected_without_writing() {
        let blobs = MemoryBlobStore::default();
        let err = save_processed_document(&blobs, "test-processed-bucket", &document(""))
            .await
            .unwrap_err();

        assert!(matches!(err, DocRagError::InvalidInput(_)));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_missing_bucket_is_configuration_error() {
        let blobs = MemoryBlobStore::default();
        let err = save_processed_document(&blobs, " ", &document("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocRagError::MissingConfiguration(_)));
        assert!(blobs.is_empty());
    }
}
