//! Collaborator seams for the search index, blob storage and knowledge base
//!
//! Backends:
//! - `memory`: in-process stores seeded from a JSON snapshot (local runs, tests)
//! - `http_kb`: remote retrieve endpoint for vector search
//! - `aws`: DynamoDB search index and S3 blobs (behind the `aws` feature)

pub mod http_kb;
pub mod memory;

#[cfg(feature = "aws")]
pub mod aws;

use std::time::Duration;

use async_trait::async_trait;

pub use http_kb::HttpKnowledgeBase;
pub use memory::KeywordKnowledgeBase;
pub use memory::MemoryBlobStore;
pub use memory::MemoryIndexStore;
pub use memory::Snapshot;

use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::DocumentRecord;
use crate::models::IndexKind;
use crate::models::IndexRecord;
use crate::models::KnowledgeBaseConfig;
use crate::models::KnowledgeBaseSync;
use crate::models::Passage;
use crate::models::ProcessedDocument;

/// Which records a kind scan returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFilter {
    /// Kind matches and an image or extracted-image URI is present
    KindWithImage,
    /// Kind matches, nothing else checked
    KindOnly,
}

/// One page of a paginated scan
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<IndexRecord>,
    /// Token for the next page, `None` once exhausted
    pub continuation: Option<String>,
}

/// Durable key-value store holding search-index records
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn scan_index_records(
        &self,
        kind: IndexKind,
        filter: ScanFilter,
        continuation: Option<String>,
    ) -> Result<RecordPage>;

    async fn put_index_record(&self, record: &IndexRecord) -> Result<()>;

    /// Knowledge-base identifiers stored under the reserved config document
    async fn knowledge_base_config(&self) -> Result<Option<KnowledgeBaseConfig>>;

    async fn put_knowledge_base_config(&self, config: &KnowledgeBaseConfig) -> Result<()>;

    /// Metadata item of one ingested document
    async fn document_record(&self, _document_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(None)
    }

    async fn put_document_record(&self, record: &DocumentRecord) -> Result<()> {
        Err(DocRagError::StoreError(format!(
            "Store does not keep document records (document {})",
            record.document_id
        )))
    }
}

/// Blob store for originals, processed JSON and overflow payloads
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Time-limited URL granting read access to one object
    async fn sign_access_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    /// Unsigned URL for the object, when the backend has one
    fn direct_url(&self, _bucket: &str, _key: &str) -> Option<String> {
        None
    }
}

/// Document-indexed search returning ranked passages
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Passage>>;

    /// Make a processed document searchable, now or through an ingestion job
    async fn add_document(&self, document: &ProcessedDocument) -> Result<KnowledgeBaseSync>;

    fn name(&self) -> &'static str;
}

/// Bucket and key of an `s3://` locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    /// Split `s3://bucket/key[#fragment]` on the first `/` after the scheme.
    ///
    /// The fragment is dropped from the key. Returns `None` for other
    /// schemes or when either part is empty.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.trim().strip_prefix("s3://")?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        let key = key.split_once('#').map_or(key, |(k, _)| k);
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    #[must_use]
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
