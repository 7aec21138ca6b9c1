use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::DocRagError;
use crate::text::truncate_chars;

/// Index values are cut to this many characters when a record is built
pub const MAX_INDEX_VALUE_CHARS: usize = 1000;

/// Document id of the record that stores knowledge-base identifiers
pub const KNOWLEDGE_BASE_CONFIG_DOCUMENT_ID: &str = "KNOWLEDGE_BASE_CONFIG";

/// Search-index record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexKind {
    Title,
    Category,
    Topic,
    Entity,
    ImageContent,
    EmbeddedImage,
    EmbeddedImageSection,
    PdfPageImage,
    QaImage,
    QaPdfPage,
}

impl IndexKind {
    /// Kinds that reference an image and are scanned per query
    pub const IMAGE_BEARING: [IndexKind; 6] = [
        IndexKind::ImageContent,
        IndexKind::EmbeddedImage,
        IndexKind::EmbeddedImageSection,
        IndexKind::PdfPageImage,
        IndexKind::QaImage,
        IndexKind::QaPdfPage,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Title => "title",
            IndexKind::Category => "category",
            IndexKind::Topic => "topic",
            IndexKind::Entity => "entity",
            IndexKind::ImageContent => "imageContent",
            IndexKind::EmbeddedImage => "embeddedImage",
            IndexKind::EmbeddedImageSection => "embeddedImageSection",
            IndexKind::PdfPageImage => "pdfPageImage",
            IndexKind::QaImage => "qaImage",
            IndexKind::QaPdfPage => "qaPdfPage",
        }
    }

    /// Name used by items written before the camelCase schema
    #[must_use]
    pub const fn legacy_name(&self) -> &'static str {
        match self {
            IndexKind::Title => "title",
            IndexKind::Category => "category",
            IndexKind::Topic => "topic",
            IndexKind::Entity => "entity",
            IndexKind::ImageContent => "image_content",
            IndexKind::EmbeddedImage => "embedded_image",
            IndexKind::EmbeddedImageSection => "embedded_image_section",
            IndexKind::PdfPageImage => "pdf_page_image",
            IndexKind::QaImage => "qa_image",
            IndexKind::QaPdfPage => "qa_pdf_page",
        }
    }

    #[must_use]
    pub const fn is_qa(&self) -> bool {
        matches!(self, IndexKind::QaImage | IndexKind::QaPdfPage)
    }

    #[must_use]
    pub fn is_image_bearing(&self) -> bool {
        Self::IMAGE_BEARING.contains(self)
    }

    /// Points added per query term found in the record value
    #[must_use]
    pub const fn term_weight(&self) -> f64 {
        match self {
            IndexKind::QaImage => 5.0,
            IndexKind::QaPdfPage => 4.0,
            IndexKind::EmbeddedImage => 3.0,
            IndexKind::ImageContent => 2.0,
            _ => 1.0,
        }
    }

    /// Parse a stored kind tag in either schema.
    ///
    /// `entity_people` style tags resolve to [`IndexKind::Entity`] with the
    /// suffix returned as the entity type.
    pub fn parse_tagged(tag: &str) -> Option<(Self, Option<String>)> {
        let tag = tag.trim();
        if let Some(entity_type) = tag.strip_prefix("entity_") {
            return Some((IndexKind::Entity, Some(entity_type.to_string())));
        }
        ALL_KINDS
            .iter()
            .find(|kind| kind.as_str() == tag || kind.legacy_name() == tag)
            .map(|kind| (*kind, None))
    }
}

const ALL_KINDS: [IndexKind; 10] = [
    IndexKind::Title,
    IndexKind::Category,
    IndexKind::Topic,
    IndexKind::Entity,
    IndexKind::ImageContent,
    IndexKind::EmbeddedImage,
    IndexKind::EmbeddedImageSection,
    IndexKind::PdfPageImage,
    IndexKind::QaImage,
    IndexKind::QaPdfPage,
];

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = DocRagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_tagged(s)
            .map(|(kind, _)| kind)
            .ok_or_else(|| DocRagError::InvalidInput(format!("Unknown index kind: {s}")))
    }
}

/// A search-index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub id: String,
    pub document_id: String,
    pub kind: IndexKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IndexRecord {
    /// New record with a fresh id; the value is truncated to [`MAX_INDEX_VALUE_CHARS`]
    pub fn new(document_id: impl Into<String>, kind: IndexKind, value: impl AsRef<str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            kind,
            entity_type: None,
            value: truncate_chars(value.as_ref(), MAX_INDEX_VALUE_CHARS).to_string(),
            image_uri: None,
            extracted_image_uri: None,
            description: None,
            position: None,
            question: None,
            answer: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_image_uri(mut self, uri: impl Into<String>) -> Self {
        self.image_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_extracted_image_uri(mut self, uri: impl Into<String>) -> Self {
        self.extracted_image_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    #[must_use]
    pub fn with_qa(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self.answer = Some(answer.into());
        self
    }

    /// Identity used for dedup: extracted image first, then the image itself
    #[must_use]
    pub fn canonical_image_uri(&self) -> Option<&str> {
        non_empty(self.extracted_image_uri.as_deref()).or_else(|| non_empty(self.image_uri.as_deref()))
    }

    #[must_use]
    pub fn has_image(&self) -> bool {
        self.canonical_image_uri().is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaPair {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default, alias = "page_number")]
    pub page_number: i64,
}

/// Image pulled out of a document during OCR
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedImage {
    #[serde(default, alias = "source_bucket")]
    pub source_bucket: String,
    #[serde(default, alias = "source_key")]
    pub source_key: String,
    #[serde(default, alias = "page_number")]
    pub page_number: i64,
    #[serde(default, alias = "file_type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, alias = "text_content")]
    pub text_content: String,
    #[serde(default, alias = "s3_uri", skip_serializing_if = "Option::is_none")]
    pub s3_uri: Option<String>,
    #[serde(
        default,
        alias = "extracted_image_s3_uri",
        skip_serializing_if = "Option::is_none"
    )]
    pub extracted_image_s3_uri: Option<String>,
    #[serde(default, alias = "extraction_error", skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    #[serde(
        default,
        alias = "ai_generated_description",
        skip_serializing_if = "Option::is_none"
    )]
    pub ai_generated_description: Option<String>,
    #[serde(default, alias = "associated_qa", skip_serializing_if = "Option::is_none")]
    pub associated_qa: Option<QaPair>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    pub value: String,
}

/// Normalized OCR output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContent {
    #[serde(default, alias = "document_type")]
    pub document_type: String,
    #[serde(default, alias = "text_content")]
    pub text_content: String,
    /// table → row → cell text
    #[serde(default)]
    pub tables: Vec<Vec<Vec<String>>>,
    #[serde(default)]
    pub forms: Vec<FormField>,
    #[serde(default)]
    pub images: Vec<ExtractedImage>,
    #[serde(default, alias = "is_image")]
    pub is_image: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default = "unknown_title")]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "unknown_category")]
    pub category: String,
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<String>>,
    #[serde(default, alias = "image_description", skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,
}

fn unknown_title() -> String {
    "Unknown Document".to_string()
}

fn unknown_category() -> String {
    "unknown".to_string()
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: unknown_title(),
            summary: "Could not generate summary".to_string(),
            topics: Vec::new(),
            category: unknown_category(),
            entities: BTreeMap::new(),
            image_description: None,
        }
    }
}

/// A processed document as written to the processed bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    #[serde(alias = "document_id")]
    pub document_id: String,
    #[serde(default, alias = "original_bucket")]
    pub original_bucket: String,
    #[serde(default, alias = "original_key")]
    pub original_key: String,
    #[serde(alias = "document_content")]
    pub document_content: DocumentContent,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default, alias = "qa_pairs")]
    pub qa_pairs: Vec<QaPair>,
}

/// Knowledge-base search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseConfig {
    #[serde(alias = "knowledge_base_id")]
    pub knowledge_base_id: String,
    #[serde(default, alias = "data_source_id")]
    pub data_source_id: String,
}

/// What adding a document to the knowledge base started or finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeBaseSync {
    /// Passages are searchable now
    Indexed { passages: usize },
    /// A remote ingestion job was started
    #[serde(rename_all = "camelCase")]
    Ingesting { job_id: String },
}

impl KnowledgeBaseSync {
    /// Value stored as `kbStatus` on the document record
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            KnowledgeBaseSync::Indexed { .. } => "INDEXED",
            KnowledgeBaseSync::Ingesting { .. } => "INGESTING",
        }
    }

    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        match self {
            KnowledgeBaseSync::Indexed { .. } => None,
            KnowledgeBaseSync::Ingesting { job_id } => Some(job_id),
        }
    }
}

/// Per-document metadata item, one per ingested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    #[serde(alias = "document_id")]
    pub document_id: String,
    #[serde(default, alias = "original_bucket")]
    pub original_bucket: String,
    #[serde(default, alias = "original_key")]
    pub original_key: String,
    #[serde(default, alias = "processed_bucket")]
    pub processed_bucket: String,
    #[serde(default, alias = "processed_key")]
    pub processed_key: String,
    #[serde(default, alias = "document_type")]
    pub document_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "has_text")]
    pub has_text: bool,
    #[serde(default, alias = "has_tables")]
    pub has_tables: bool,
    #[serde(default, alias = "has_forms")]
    pub has_forms: bool,
    #[serde(default, alias = "is_image")]
    pub is_image: bool,
    #[serde(default, alias = "image_count")]
    pub image_count: usize,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "kb_status", skip_serializing_if = "Option::is_none")]
    pub kb_status: Option<String>,
    #[serde(default, alias = "ingestion_job_id", skip_serializing_if = "Option::is_none")]
    pub ingestion_job_id: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Record for a document saved under `processed_bucket/processed_key`
    pub fn processed(
        document: &ProcessedDocument,
        processed_bucket: &str,
        processed_key: &str,
    ) -> Self {
        let content = &document.document_content;
        let metadata = &document.metadata;
        let now = Utc::now();
        Self {
            document_id: document.document_id.clone(),
            original_bucket: document.original_bucket.clone(),
            original_key: document.original_key.clone(),
            processed_bucket: processed_bucket.to_string(),
            processed_key: processed_key.to_string(),
            document_type: content.document_type.clone(),
            title: metadata.title.clone(),
            summary: metadata.summary.clone(),
            topics: metadata.topics.clone(),
            category: metadata.category.clone(),
            has_text: !content.text_content.trim().is_empty(),
            has_tables: !content.tables.is_empty(),
            has_forms: !content.forms.is_empty(),
            is_image: content.is_image,
            image_count: content.images.len(),
            status: "PROCESSED".to_string(),
            kb_status: None,
            ingestion_job_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Note the outcome of adding the document to the knowledge base
    pub fn record_sync(&mut self, sync: &KnowledgeBaseSync) {
        self.kb_status = Some(sync.status().to_string());
        self.ingestion_job_id = sync.job_id().map(ToString::to_string);
        self.updated_at = Utc::now();
    }
}

/// Pointer to a payload that was too large to pass inline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadReference {
    pub bucket: String,
    pub key: String,
}

/// One image in a query response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedImageBlock {
    pub description: String,
    pub uri: String,
    pub relevance_score: f64,
    pub rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_terms: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_qa_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pdf_uri: Option<String>,
}

/// Entry of the interleaved response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image(FormattedImageBlock),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub images: Vec<FormattedImageBlock>,
    pub structured_response: Vec<ContentBlock>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_accepts_both_schemas() {
        assert_eq!(
            IndexKind::parse_tagged("embedded_image"),
            Some((IndexKind::EmbeddedImage, None))
        );
        assert_eq!(
            IndexKind::parse_tagged("embeddedImage"),
            Some((IndexKind::EmbeddedImage, None))
        );
        assert_eq!(
            IndexKind::parse_tagged("entity_people"),
            Some((IndexKind::Entity, Some("people".to_string())))
        );
        assert!(IndexKind::parse_tagged("thumbnail").is_none());
        assert!("qa_pdf_page".parse::<IndexKind>().is_ok());
    }

    #[test]
    fn test_kind_weights() {
        assert!((IndexKind::QaImage.term_weight() - 5.0).abs() < f64::EPSILON);
        assert!((IndexKind::QaPdfPage.term_weight() - 4.0).abs() < f64::EPSILON);
        assert!((IndexKind::EmbeddedImage.term_weight() - 3.0).abs() < f64::EPSILON);
        assert!((IndexKind::ImageContent.term_weight() - 2.0).abs() < f64::EPSILON);
        assert!((IndexKind::PdfPageImage.term_weight() - 1.0).abs() < f64::EPSILON);
        assert!((IndexKind::Title.term_weight() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_value_truncated() {
        let long = "x".repeat(MAX_INDEX_VALUE_CHARS + 50);
        let record = IndexRecord::new("doc", IndexKind::Title, &long);
        assert_eq!(record.value.chars().count(), MAX_INDEX_VALUE_CHARS);
    }

    #[test]
    fn test_canonical_uri_prefers_extracted() {
        let record = IndexRecord::new("doc", IndexKind::PdfPageImage, "page")
            .with_image_uri("s3://b/doc.pdf#page=3")
            .with_extracted_image_uri("s3://b/img1.png");
        assert_eq!(record.canonical_image_uri(), Some("s3://b/img1.png"));

        let blank = IndexRecord::new("doc", IndexKind::EmbeddedImage, "x")
            .with_image_uri("s3://b/img2.png")
            .with_extracted_image_uri("  ");
        assert_eq!(blank.canonical_image_uri(), Some("s3://b/img2.png"));

        let none = IndexRecord::new("doc", IndexKind::EmbeddedImage, "x");
        assert!(!none.has_image());
    }

    #[test]
    fn test_content_block_serialization() {
        let block = ContentBlock::text("hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");

        let image = ContentBlock::Image(FormattedImageBlock {
            description: "A diagram".to_string(),
            uri: "s3://b/k.png".to_string(),
            relevance_score: 7.5,
            rank: 1,
            access_url: None,
            direct_url: None,
            matched_terms: vec![],
            is_qa_image: false,
            question: None,
            answer: None,
            source_pdf_uri: None,
        });
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["relevanceScore"], 7.5);
        assert!(json.get("accessUrl").is_none());
        assert!(json.get("isQaImage").is_none());
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata: DocumentMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(metadata.title, "Unknown Document");
        assert_eq!(metadata.category, "unknown");
        assert!(metadata.topics.is_empty());
    }

    #[test]
    fn test_processed_document_accepts_snake_case() {
        let json = serde_json::json!({
            "document_id": "report",
            "original_bucket": "uploads",
            "original_key": "docs/report.pdf",
            "document_content": {
                "document_type": "pdf",
                "text_content": "hello",
                "is_image": false,
                "images": [{"page_number": 2, "s3_uri": "s3://b/p2.png"}]
            },
            "qa_pairs": [{"question": "Q", "answer": "A", "page_number": 2}]
        });
        let doc: ProcessedDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.document_id, "report");
        assert_eq!(doc.document_content.images[0].page_number, 2);
        assert_eq!(doc.qa_pairs[0].page_number, 2);
        assert_eq!(doc.metadata.title, "Unknown Document");
    }

    #[test]
    fn test_knowledge_base_sync_wire_shape() {
        let sync = KnowledgeBaseSync::Ingesting {
            job_id: "job-7".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&sync).unwrap(),
            serde_json::json!({"status": "INGESTING", "jobId": "job-7"})
        );

        let document = ProcessedDocument {
            document_id: "manual".to_string(),
            original_bucket: "uploads".to_string(),
            original_key: "manual.pdf".to_string(),
            document_content: DocumentContent::default(),
            metadata: DocumentMetadata::default(),
            qa_pairs: Vec::new(),
        };
        let mut record = DocumentRecord::processed(&document, "processed", "manual.json");
        record.record_sync(&sync);
        assert_eq!(record.kb_status.as_deref(), Some("INGESTING"));
        assert_eq!(record.ingestion_job_id.as_deref(), Some("job-7"));

        record.record_sync(&KnowledgeBaseSync::Indexed { passages: 2 });
        assert_eq!(record.kb_status.as_deref(), Some("INDEXED"));
        assert!(record.ingestion_job_id.is_none());
    }
}
