//! Search-index records for a processed document

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::IndexKind;
use crate::models::IndexRecord;
use crate::models::ProcessedDocument;
use crate::storage::IndexStore;

/// What indexing a document produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub document_id: String,
    pub records_written: usize,
    pub records_failed: usize,
    pub per_kind: BTreeMap<String, usize>,
    pub records: Vec<IndexRecord>,
}

/// Every index record derived from a processed document, in write order
pub fn build_index_records(document: &ProcessedDocument) -> Vec<IndexRecord> {
    let doc_id = document
        .document_id
        .rsplit('/')
        .next()
        .unwrap_or(&document.document_id);
    let metadata = &document.metadata;
    let content = &document.document_content;
    let mut records = Vec::new();

    let mut push_text = |kind: IndexKind, value: &str, entity_type: Option<&str>| {
        if value.trim().is_empty() {
            return;
        }
        let record = IndexRecord::new(doc_id, kind, value);
        records.push(match entity_type {
            Some(entity_type) => record.with_entity_type(entity_type),
            None => record,
        });
    };

    push_text(IndexKind::Title, &metadata.title, None);
    push_text(IndexKind::Category, &metadata.category, None);
    for topic in &metadata.topics {
        push_text(IndexKind::Topic, topic, None);
    }
    for (entity_type, names) in &metadata.entities {
        for name in names {
            push_text(IndexKind::Entity, name, Some(entity_type.as_str()));
        }
    }

    let document_description = non_blank(metadata.image_description.as_deref());

    if content.is_image && !document.original_bucket.is_empty() && !document.original_key.is_empty() {
        let mut record = IndexRecord::new(doc_id, IndexKind::ImageContent, &content.text_content)
            .with_image_uri(format!(
                "s3://{}/{}",
                document.original_bucket, document.original_key
            ));
        if let Some(description) = document_description {
            record = record.with_description(description);
        }
        records.push(record);
    }

    for (position, image) in content.images.iter().enumerate() {
        let position = position as i64;
        let page_uri = non_blank(image.s3_uri.as_deref());
        let extracted_uri = non_blank(image.extracted_image_s3_uri.as_deref());
        let Some(image_uri) = extracted_uri.or(page_uri) else {
            debug!("Image {} of {} has no location, skipping", position, doc_id);
            continue;
        };
        let description = non_blank(image.ai_generated_description.as_deref()).or(document_description);

        let build = |kind: IndexKind, uri: &str| {
            let record = IndexRecord::new(doc_id, kind, &image.text_content)
                .with_image_uri(uri)
                .with_position(position);
            match description {
                Some(description) => record.with_description(description),
                None => record,
            }
        };

        records.push(build(IndexKind::EmbeddedImage, image_uri));

        if let (Some(page_uri), Some(extracted_uri)) = (page_uri, extracted_uri) {
            records.push(build(IndexKind::PdfPageImage, page_uri).with_extracted_image_uri(extracted_uri));
        }

        if let Some(qa) = &image.associated_qa {
            let record = match (extracted_uri, page_uri) {
                (Some(extracted_uri), _) => build(IndexKind::QaImage, extracted_uri),
                (None, Some(page_uri)) => build(IndexKind::QaPdfPage, page_uri),
                (None, None) => continue,
            };
            records.push(record.with_qa(&qa.question, &qa.answer));
        }
    }

    records
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Writes a document's index records through an [`IndexStore`]
pub struct DocumentIndexer {
    store: Arc<dyn IndexStore>,
}

impl DocumentIndexer {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    /// Build and store every record. Individual write failures are counted and skipped.
    ///
    /// # Errors
    /// - `InvalidInput` for a document without an id
    /// - `StoreError` when records exist but none could be written
    pub async fn index(&self, document: &ProcessedDocument) -> Result<IndexSummary> {
        if document.document_id.trim().is_empty() {
            return Err(DocRagError::InvalidInput(
                "Processed document is missing documentId".to_string(),
            ));
        }

        let records = build_index_records(document);
        let mut summary = IndexSummary {
            document_id: document.document_id.clone(),
            ..IndexSummary::default()
        };

        for record in records {
            match self.store.put_index_record(&record).await {
                Ok(()) => {
                    summary.records_written += 1;
                    *summary
                        .per_kind
                        .entry(record.kind.as_str().to_string())
                        .or_default() += 1;
                    summary.records.push(record);
                }
                Err(e) => {
                    warn!("⚠️  Failed to store {} record for {}: {}", record.kind, record.document_id, e);
                    summary.records_failed += 1;
                }
            }
        }

        if summary.records_written == 0 && summary.records_failed > 0 {
            return Err(DocRagError::StoreError(format!(
                "None of the {} index records for {} could be stored",
                summary.records_failed, summary.document_id
            )));
        }

        info!(
            "📇 Indexed {}: {} records written, {} failed",
            summary.document_id, summary.records_written, summary.records_failed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::DocumentContent;
    use crate::models::DocumentMetadata;
    use crate::models::ExtractedImage;
    use crate::models::QaPair;
    use crate::storage::MemoryIndexStore;

    fn document() -> ProcessedDocument {
        let mut entities = BTreeMap::new();
        entities.insert("organizations".to_string(), vec!["Acme".to_string(), String::new()]);

        ProcessedDocument {
            document_id: "uploads/manual".to_string(),
            original_bucket: "raw".to_string(),
            original_key: "uploads/manual.pdf".to_string(),
            document_content: DocumentContent {
                document_type: "pdf".to_string(),
                text_content: "Router manual".to_string(),
                images: vec![
                    ExtractedImage {
                        page_number: 3,
                        text_content: "wiring".to_string(),
                        s3_uri: Some("s3://raw/uploads/manual.pdf#page=3".to_string()),
                        extracted_image_s3_uri: Some("s3://proc/img1.png".to_string()),
                        ai_generated_description: Some("A wiring diagram".to_string()),
                        associated_qa: Some(QaPair {
                            question: "How do I wire it?".to_string(),
                            answer: "Red to red".to_string(),
                            page_number: 3,
                        }),
                        ..ExtractedImage::default()
                    },
                    ExtractedImage {
                        page_number: 4,
                        text_content: "page scan".to_string(),
                        s3_uri: Some("s3://raw/uploads/manual.pdf#page=4".to_string()),
                        associated_qa: Some(QaPair {
                            question: "Where is the reset button?".to_string(),
                            answer: "On the back".to_string(),
                            page_number: 4,
                        }),
                        ..ExtractedImage::default()
                    },
                    ExtractedImage::default(),
                ],
                ..DocumentContent::default()
            },
            metadata: DocumentMetadata {
                title: "Router Manual".to_string(),
                topics: vec!["networking".to_string(), " ".to_string()],
                category: "technical".to_string(),
                entities,
                image_description: Some("Manual figures".to_string()),
                ..DocumentMetadata::default()
            },
            qa_pairs: Vec::new(),
        }
    }

    fn kinds(records: &[IndexRecord]) -> Vec<IndexKind> {
        records.iter().map(|r| r.kind).collect()
    }

    #[test]
    fn test_records_for_document_with_images() {
        let records = build_index_records(&document());
        assert_eq!(
            kinds(&records),
            vec![
                IndexKind::Title,
                IndexKind::Category,
                IndexKind::Topic,
                IndexKind::Entity,
                IndexKind::EmbeddedImage,
                IndexKind::PdfPageImage,
                IndexKind::QaImage,
                IndexKind::EmbeddedImage,
                IndexKind::QaPdfPage,
            ]
        );
        assert!(records.iter().all(|r| r.document_id == "manual"));
        assert_eq!(records[3].entity_type.as_deref(), Some("organizations"));

        let page = &records[5];
        assert_eq!(page.image_uri.as_deref(), Some("s3://raw/uploads/manual.pdf#page=3"));
        assert_eq!(page.canonical_image_uri(), Some("s3://proc/img1.png"));

        let qa_image = &records[6];
        assert_eq!(qa_image.question.as_deref(), Some("How do I wire it?"));
        assert_eq!(qa_image.description.as_deref(), Some("A wiring diagram"));

        let qa_page = &records[8];
        assert_eq!(qa_page.image_uri.as_deref(), Some("s3://raw/uploads/manual.pdf#page=4"));
        assert_eq!(qa_page.description.as_deref(), Some("Manual figures"));
        assert_eq!(qa_page.position, Some(1));
    }

    #[test]
    fn test_image_document_gets_image_content_record() {
        let mut doc = document();
        doc.document_content.is_image = true;
        doc.document_content.images.clear();

        let records = build_index_records(&doc);
        let image = records.last().unwrap();
        assert_eq!(image.kind, IndexKind::ImageContent);
        assert_eq!(image.image_uri.as_deref(), Some("s3://raw/uploads/manual.pdf"));
        assert_eq!(image.value, "Router manual");
    }

    #[tokio::test]
    async fn test_indexer_writes_records() {
        let store = Arc::new(MemoryIndexStore::default());
        let summary = DocumentIndexer::new(store.clone()).index(&document()).await.unwrap();

        assert_eq!(summary.records_written, 9);
        assert_eq!(summary.records_failed, 0);
        assert_eq!(summary.per_kind.get("embeddedImage"), Some(&2));
        assert_eq!(store.len().await, 9);
    }

    #[tokio::test]
    async fn test_indexer_rejects_missing_id() {
        let mut doc = document();
        doc.document_id = String::new();
        let err = DocumentIndexer::new(Arc::new(MemoryIndexStore::default()))
            .index(&doc)
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }
}
