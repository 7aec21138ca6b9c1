//! One entry point from an uploaded object to a searchable document

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use tracing::warn;

use super::describe::ImageDescriber;
use super::document_id_from_key;
use super::extract::extract_document;
use super::extract::TextExtractor;
use super::indexer::DocumentIndexer;
use super::indexer::IndexSummary;
use super::knowledge_base::sync_knowledge_base;
use super::metadata::extract_metadata;
use super::processed::load_processed_document;
use super::processed::save_processed_document;
use crate::capabilities::Collaborators;
use crate::errors::DocRagError;
use crate::errors::Result;
use crate::llm::TextGenerator;
use crate::models::DocumentRecord;
use crate::models::KnowledgeBaseConfig;
use crate::models::KnowledgeBaseSync;
use crate::models::ProcessedDocument;
use crate::payload::resolve_event;
use crate::payload::ProcessedLocation;
use crate::poll::Backoff;
use crate::poll::Sleeper;
use crate::poll::TokioSleeper;
use crate::storage::BlobStore;
use crate::storage::IndexStore;
use crate::storage::KnowledgeBase;
use crate::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub processed_bucket: String,
    pub extract_metadata: bool,
    pub describe_images: bool,
    pub sync_knowledge_base: bool,
    pub backoff: Backoff,
}

impl IngestOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            processed_bucket: config.storage.processed_bucket.clone(),
            extract_metadata: true,
            describe_images: true,
            sync_knowledge_base: true,
            backoff: Backoff::default(),
        }
    }
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: String,
    pub processed: ProcessedLocation,
    pub records_written: usize,
    pub records_failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<KnowledgeBaseSync>,
}

impl IngestReport {
    fn new(processed: ProcessedLocation, index: &IndexSummary, knowledge_base: Option<KnowledgeBaseSync>) -> Self {
        Self {
            document_id: index.document_id.clone(),
            processed,
            records_written: index.records_written,
            records_failed: index.records_failed,
            knowledge_base,
        }
    }
}

/// Extract, enrich, save, index and sync documents
pub struct DocumentIngestor {
    extractor: Arc<dyn TextExtractor>,
    sleeper: Arc<dyn Sleeper>,
    blobs: Arc<dyn BlobStore>,
    index_store: Arc<dyn IndexStore>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    generator: Arc<dyn TextGenerator>,
    knowledge_base_config: Option<KnowledgeBaseConfig>,
    options: IngestOptions,
}

impl DocumentIngestor {
    pub fn new(
        collaborators: &Collaborators,
        knowledge_base_config: Option<KnowledgeBaseConfig>,
        options: IngestOptions,
    ) -> Self {
        Self {
            extractor: collaborators.extractor.clone(),
            sleeper: Arc::new(TokioSleeper),
            blobs: collaborators.blobs.clone(),
            index_store: collaborators.index_store.clone(),
            knowledge_base: collaborators.knowledge_base.clone(),
            generator: collaborators.generator.clone(),
            knowledge_base_config,
            options,
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Run an uploaded object through extraction, metadata, image
    /// descriptions, the processed bucket, the index and the knowledge base.
    ///
    /// # Errors
    /// - `InvalidInput` for a blank bucket or key
    /// - Extraction failures and timeouts
    /// - Blob and index store errors
    ///
    /// A failed knowledge-base sync is logged and reported as `None`.
    pub async fn ingest_object(&self, bucket: &str, key: &str) -> Result<IngestReport> {
        if bucket.trim().is_empty() || key.trim().is_empty() {
            return Err(DocRagError::InvalidInput(
                "Both bucket and key are required".to_string(),
            ));
        }

        let document_content = extract_document(
            self.extractor.as_ref(),
            self.sleeper.as_ref(),
            self.options.backoff,
            bucket,
            key,
        )
        .await?;

        let mut document = ProcessedDocument {
            document_id: document_id_from_key(key),
            original_bucket: bucket.to_string(),
            original_key: key.to_string(),
            document_content,
            metadata: Default::default(),
            qa_pairs: Vec::new(),
        };

        if self.options.extract_metadata {
            document.metadata =
                extract_metadata(self.generator.as_ref(), &document.document_content).await;
        }
        if self.options.describe_images && !document.document_content.images.is_empty() {
            ImageDescriber::new(self.generator.clone(), self.blobs.clone())
                .describe_document(&mut document)
                .await;
        }

        let processed =
            save_processed_document(self.blobs.as_ref(), &self.options.processed_bucket, &document)
                .await?;
        self.finish(&document, processed).await
    }

    /// Index a document already in the processed bucket, located by a step
    /// event (inline fields or a payload reference)
    ///
    /// # Errors
    /// - `InvalidInput` when the event names no processed document
    /// - Blob read, JSON and index store errors
    pub async fn ingest_event(&self, event: &Value) -> Result<IngestReport> {
        let location = resolve_event(self.blobs.as_ref(), event).await?;
        let document = load_processed_document(self.blobs.as_ref(), &location).await?;
        self.finish(&document, location).await
    }

    async fn finish(&self, document: &ProcessedDocument, processed: ProcessedLocation) -> Result<IngestReport> {
        let index = DocumentIndexer::new(self.index_store.clone())
            .index(document)
            .await?;

        let record = DocumentRecord::processed(
            document,
            &processed.processed_bucket,
            &processed.processed_key,
        );
        if let Err(e) = self.index_store.put_document_record(&record).await {
            warn!("⚠️  Document record for {} not stored: {}", document.document_id, e);
        }

        let knowledge_base = if self.options.sync_knowledge_base {
            match sync_knowledge_base(
                self.index_store.as_ref(),
                self.knowledge_base.as_ref(),
                self.knowledge_base_config.as_ref(),
                document,
            )
            .await
            {
                Ok(sync) => Some(sync),
                Err(e) => {
                    warn!("⚠️  Knowledge base sync failed for {}: {}", document.document_id, e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "🚀 Ingested {} ({} records, knowledge base {})",
            document.document_id,
            index.records_written,
            knowledge_base.as_ref().map_or("skipped", KnowledgeBaseSync::status)
        );
        Ok(IngestReport::new(processed, &index, knowledge_base))
    }
}
