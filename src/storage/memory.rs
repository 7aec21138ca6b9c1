//! In-process backends seeded from a JSON snapshot

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::info;
use url::Url;

use super::BlobStore;
use super::IndexStore;
use super::KnowledgeBase;
use super::RecordPage;
use super::ScanFilter;
use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::DocumentRecord;
use crate::models::IndexKind;
use crate::models::IndexRecord;
use crate::models::KnowledgeBaseConfig;
use crate::models::KnowledgeBaseSync;
use crate::models::Passage;
use crate::models::ProcessedDocument;
use crate::payload::normalize_index_items;
use crate::text::chunk_paragraphs;
use crate::text::tokenize_query;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Longest passage the keyword knowledge base stores
const PASSAGE_CHARS: usize = 1000;

/// On-disk seed for the memory backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Raw index items; either schema is accepted
    #[serde(default)]
    pub index_records: Vec<Value>,
    #[serde(default)]
    pub passages: Vec<Passage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<KnowledgeBaseConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentRecord>,
}

impl Snapshot {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        info!(
            "📂 Loaded snapshot {} ({} index items, {} passages)",
            path.as_ref().display(),
            snapshot.index_records.len(),
            snapshot.passages.len()
        );
        Ok(snapshot)
    }

    /// Load the snapshot, or an empty one if the file does not exist
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            debug!("No snapshot at {}, starting empty", path.as_ref().display());
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Append records in the camelCase schema
    pub fn append_records(&mut self, records: &[IndexRecord]) -> Result<()> {
        for record in records {
            self.index_records.push(serde_json::to_value(record)?);
        }
        Ok(())
    }

    /// Current contents of the memory backends
    pub async fn capture(store: &MemoryIndexStore, knowledge_base: &KeywordKnowledgeBase) -> Result<Self> {
        let mut snapshot = Self {
            passages: knowledge_base.passages().await,
            knowledge_base: store.knowledge_base_config().await?,
            documents: store.documents().await,
            ..Self::default()
        };
        snapshot.append_records(&store.records().await)?;
        Ok(snapshot)
    }
}

/// Search index held in memory, paginated like the remote store
pub struct MemoryIndexStore {
    records: RwLock<Vec<IndexRecord>>,
    kb_config: RwLock<Option<KnowledgeBaseConfig>>,
    documents: RwLock<BTreeMap<String, DocumentRecord>>,
    page_size: usize,
}

impl Default for MemoryIndexStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MemoryIndexStore {
    pub fn new(records: Vec<IndexRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            kb_config: RwLock::new(None),
            documents: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let documents = snapshot
            .documents
            .iter()
            .map(|d| (d.document_id.clone(), d.clone()))
            .collect();
        Self {
            kb_config: RwLock::new(snapshot.knowledge_base.clone()),
            documents: RwLock::new(documents),
            ..Self::new(normalize_index_items(&snapshot.index_records))
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All records, in insertion order
    pub async fn records(&self) -> Vec<IndexRecord> {
        self.records.read().await.clone()
    }

    /// Document records ordered by document id
    pub async fn documents(&self) -> Vec<DocumentRecord> {
        self.documents.read().await.values().cloned().collect()
    }
}

fn matches_filter(record: &IndexRecord, kind: IndexKind, filter: ScanFilter) -> bool {
    record.kind == kind
        && match filter {
            ScanFilter::KindWithImage => record.has_image(),
            ScanFilter::KindOnly => true,
        }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn scan_index_records(
        &self,
        kind: IndexKind,
        filter: ScanFilter,
        continuation: Option<String>,
    ) -> Result<RecordPage> {
        let offset = match continuation {
            Some(token) => token.parse::<usize>().map_err(|_| {
                DocRagError::StoreError(format!("Invalid continuation token: {token}"))
            })?,
            None => 0,
        };

        let records = self.records.read().await;
        let mut matching = records
            .iter()
            .filter(|r| matches_filter(r, kind, filter))
            .skip(offset);

        let page: Vec<IndexRecord> = matching.by_ref().take(self.page_size).cloned().collect();
        let continuation = matching
            .next()
            .map(|_| (offset + page.len()).to_string());

        Ok(RecordPage {
            records: page,
            continuation,
        })
    }

    async fn put_index_record(&self, record: &IndexRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn knowledge_base_config(&self) -> Result<Option<KnowledgeBaseConfig>> {
        Ok(self.kb_config.read().await.clone())
    }

    async fn put_knowledge_base_config(&self, config: &KnowledgeBaseConfig) -> Result<()> {
        *self.kb_config.write().await = Some(config.clone());
        Ok(())
    }

    async fn document_record(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.documents.read().await.get(document_id).cloned())
    }

    async fn put_document_record(&self, record: &DocumentRecord) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(record.document_id.clone(), record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
}

/// Blob store keyed by (bucket, key); signs URLs with a shared secret
pub struct MemoryBlobStore {
    objects: DashMap<(String, String), StoredObject>,
    base_url: String,
    secret: String,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(
            crate::config::default_blob_base_url(),
            crate::config::default_signing_secret(),
        )
    }
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.content_type.clone())
    }

    /// Hex SHA-256 over secret, bucket, key and expiry
    pub fn signature(&self, bucket: &str, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"|");
        hasher.update(bucket.as_bytes());
        hasher.update(b"|");
        hasher.update(key.as_bytes());
        hasher.update(b"|");
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// `{base_url}/{bucket}/{key}` with each path segment percent-encoded
    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DocRagError::BlobError(format!("Invalid blob base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| {
                DocRagError::BlobError(format!("Blob base URL cannot hold a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn sign_access_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signature(bucket, key, expires);
        let mut url = self.object_url(bucket, key)?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| DocRagError::BlobError(format!("No such object: s3://{bucket}/{key}")))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn direct_url(&self, bucket: &str, key: &str) -> Option<String> {
        self.object_url(bucket, key).ok().map(String::from)
    }
}

/// Term-overlap search over passages held in memory
pub struct KeywordKnowledgeBase {
    passages: RwLock<Vec<Passage>>,
}

impl KeywordKnowledgeBase {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages: RwLock::new(passages),
        }
    }

    pub async fn passages(&self) -> Vec<Passage> {
        self.passages.read().await.clone()
    }
}

/// Passages for a processed document: text paragraphs, then form fields
fn document_passages(document: &ProcessedDocument) -> Vec<Passage> {
    let content = &document.document_content;
    let source_uri = (!document.original_bucket.is_empty() && !document.original_key.is_empty())
        .then(|| format!("s3://{}/{}", document.original_bucket, document.original_key));

    let mut text = content.text_content.clone();
    if !content.forms.is_empty() {
        let fields: Vec<String> = content
            .forms
            .iter()
            .map(|f| format!("{}: {}", f.key, f.value))
            .collect();
        text.push_str("\n\n");
        text.push_str(&fields.join("\n"));
    }

    chunk_paragraphs(&text, PASSAGE_CHARS)
        .into_iter()
        .map(|chunk| Passage {
            text: chunk,
            source_uri: source_uri.clone(),
            score: 0.0,
        })
        .collect()
}

#[async_trait]
impl KnowledgeBase for KeywordKnowledgeBase {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Passage>> {
        let terms = tokenize_query(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let passages = self.passages.read().await;
        let mut hits: Vec<Passage> = passages
            .iter()
            .filter_map(|p| {
                let text = p.text.to_lowercase();
                let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (hits > 0).then(|| Passage {
                    score: hits as f64 / terms.len() as f64,
                    ..p.clone()
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Replaces earlier passages from the same source
    async fn add_document(&self, document: &ProcessedDocument) -> Result<KnowledgeBaseSync> {
        let added = document_passages(document);
        let count = added.len();

        let mut passages = self.passages.write().await;
        if let Some(source) = added.first().and_then(|p| p.source_uri.clone()) {
            passages.retain(|p| p.source_uri.as_deref() != Some(source.as_str()));
        }
        passages.extend(added);

        info!(
            "📚 Added {} passages for {} ({} total)",
            count,
            document.document_id,
            passages.len()
        );
        Ok(KnowledgeBaseSync::Indexed { passages: count })
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_record(kind: IndexKind, uri: Option<&str>) -> IndexRecord {
        let record = IndexRecord::new("doc", kind, "value");
        match uri {
            Some(uri) => record.with_image_uri(uri),
            None => record,
        }
    }

    #[tokio::test]
    async fn test_scan_paginates_and_filters() {
        let mut records = Vec::new();
        for i in 0..5 {
            records.push(image_record(
                IndexKind::EmbeddedImage,
                Some(&format!("s3://b/{i}.png")),
            ));
        }
        records.push(image_record(IndexKind::EmbeddedImage, None));
        records.push(image_record(IndexKind::Title, None));
        let store = MemoryIndexStore::new(records).with_page_size(2);

        let mut seen = 0;
        let mut token = None;
        let mut pages = 0;
        loop {
            let page = store
                .scan_index_records(IndexKind::EmbeddedImage, ScanFilter::KindWithImage, token)
                .await
                .unwrap();
            seen += page.records.len();
            pages += 1;
            token = page.continuation;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(seen, 5);
        assert_eq!(pages, 3);

        let all = store
            .scan_index_records(IndexKind::EmbeddedImage, ScanFilter::KindOnly, None)
            .await
            .unwrap();
        assert_eq!(all.records.len(), 2);
        assert!(all.continuation.is_some());
    }

    #[tokio::test]
    async fn test_scan_rejects_bad_token() {
        let store = MemoryIndexStore::default();
        let result = store
            .scan_index_records(IndexKind::QaImage, ScanFilter::KindOnly, Some("abc".into()))
            .await;
        assert!(matches!(result, Err(DocRagError::StoreError(_))));
    }

    #[tokio::test]
    async fn test_signed_url_carries_valid_signature() {
        let blobs = MemoryBlobStore::new("http://blobs.local/", "secret");
        let url = blobs
            .sign_access_url("bucket", "img/1.png", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("http://blobs.local/bucket/img/1.png?expires="));

        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut signature = String::new();
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("signature", v) => signature = v.to_string(),
                _ => {}
            }
        }
        assert_eq!(signature, blobs.signature("bucket", "img/1.png", expires));
        assert_eq!(
            blobs.direct_url("bucket", "img/1.png").as_deref(),
            Some("http://blobs.local/bucket/img/1.png")
        );
    }

    #[tokio::test]
    async fn test_signed_url_encodes_key_segments() {
        let blobs = MemoryBlobStore::new("http://blobs.local", "secret");
        let key = "my docs/a?b%#1.png";
        let signed = blobs
            .sign_access_url("bucket", key, Duration::from_secs(60))
            .await
            .unwrap();

        let url = Url::parse(&signed).unwrap();
        assert_eq!(url.path(), "/bucket/my%20docs/a%3Fb%25%231.png");
        assert!(url.fragment().is_none());

        let segments: Vec<String> = url
            .path_segments()
            .unwrap()
            .skip(1)
            .map(|s| {
                url::form_urlencoded::parse(format!("k={s}").as_bytes())
                    .next()
                    .unwrap()
                    .1
                    .into_owned()
            })
            .collect();
        assert_eq!(segments.join("/"), key);

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        let expires: i64 = pairs["expires"].parse().unwrap();
        assert_eq!(pairs["signature"], blobs.signature("bucket", key, expires));
        assert_eq!(
            blobs.direct_url("bucket", key).as_deref(),
            Some("http://blobs.local/bucket/my%20docs/a%3Fb%25%231.png")
        );
    }

    #[tokio::test]
    async fn test_blob_roundtrip_and_missing() {
        let blobs = MemoryBlobStore::default();
        blobs
            .put_object("b", "k.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(blobs.get_object("b", "k.json").await.unwrap(), b"{}");
        assert_eq!(blobs.content_type("b", "k.json").as_deref(), Some("application/json"));
        assert!(blobs.get_object("b", "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_keyword_search_ranks_by_overlap() {
        let kb = KeywordKnowledgeBase::new(vec![
            Passage {
                text: "Router installation guide".to_string(),
                source_uri: Some("s3://docs/install.pdf".to_string()),
                score: 0.0,
            },
            Passage {
                text: "Warranty terms and router installation".to_string(),
                source_uri: None,
                score: 0.0,
            },
            Passage {
                text: "Unrelated".to_string(),
                source_uri: None,
                score: 0.0,
            },
        ]);
        let hits = kb.search("router warranty", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.starts_with("Warranty"));
        assert!(kb.search("a an", 5).await.unwrap().is_empty());
    }

    fn manual(text: &str) -> ProcessedDocument {
        ProcessedDocument {
            document_id: "manual".to_string(),
            original_bucket: "uploads".to_string(),
            original_key: "docs/manual.txt".to_string(),
            document_content: crate::models::DocumentContent {
                document_type: ".txt".to_string(),
                text_content: text.to_string(),
                ..Default::default()
            },
            metadata: crate::models::DocumentMetadata::default(),
            qa_pairs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_added_document_becomes_searchable() {
        let kb = KeywordKnowledgeBase::new(vec![Passage {
            text: "Unrelated cooking notes".to_string(),
            source_uri: None,
            score: 0.0,
        }]);
        assert!(kb.search("warranty", 5).await.unwrap().is_empty());

        let sync = kb
            .add_document(&manual("Warranty lasts two years.\n\nReset with the pin."))
            .await
            .unwrap();
        assert_eq!(sync, KnowledgeBaseSync::Indexed { passages: 1 });

        let hits = kb.search("warranty", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_uri.as_deref(), Some("s3://uploads/docs/manual.txt"));

        // Re-adding the same source replaces its passages
        kb.add_document(&manual("Warranty now lasts three years."))
            .await
            .unwrap();
        let passages = kb.passages().await;
        assert_eq!(passages.len(), 2);
        assert!(passages[1].text.contains("three years"));
    }

    #[tokio::test]
    async fn test_capture_keeps_documents_and_passages() {
        let store = MemoryIndexStore::new(vec![image_record(
            IndexKind::EmbeddedImage,
            Some("s3://b/1.png"),
        )]);
        let document = manual("Warranty lasts two years.");
        store
            .put_document_record(&DocumentRecord::processed(&document, "processed", "docs/manual.json"))
            .await
            .unwrap();
        let kb = KeywordKnowledgeBase::new(Vec::new());
        kb.add_document(&document).await.unwrap();

        let snapshot = Snapshot::capture(&store, &kb).await.unwrap();
        assert_eq!(snapshot.index_records.len(), 1);
        assert_eq!(snapshot.passages.len(), 1);
        assert_eq!(snapshot.documents.len(), 1);

        let reloaded = MemoryIndexStore::from_snapshot(&snapshot);
        let record = reloaded.document_record("manual").await.unwrap().unwrap();
        assert_eq!(record.processed_key, "docs/manual.json");
        assert_eq!(record.status, "PROCESSED");
        assert!(reloaded.document_record("other").await.unwrap().is_none());
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        let snapshot = Snapshot {
            index_records: vec![serde_json::json!({
                "document_id": "d", "index_type": "embedded_image",
                "index_value": "x", "image_s3_uri": "s3://b/x.png"
            })],
            passages: vec![],
            knowledge_base: None,
            documents: vec![],
        };
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::from_file(&path).unwrap();
        assert_eq!(loaded.index_records.len(), 1);
        assert!(Snapshot::load_or_empty(dir.path().join("missing.json"))
            .unwrap()
            .index_records
            .is_empty());
    }

    #[tokio::test]
    async fn test_appended_records_reload_into_store() {
        let mut snapshot = Snapshot::default();
        let record = IndexRecord::new("doc", IndexKind::QaImage, "reset steps")
            .with_image_uri("s3://b/reset.png")
            .with_qa("How do I reset?", "Hold the button");
        snapshot.append_records(&[record.clone()]).unwrap();

        let store = MemoryIndexStore::from_snapshot(&snapshot);
        assert_eq!(store.records().await, vec![record]);
    }
}
