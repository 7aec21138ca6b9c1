//! DynamoDB search index and S3 blob store

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use super::BlobStore;
use super::IndexStore;
use super::RecordPage;
use super::ScanFilter;
use crate::config::AppConfig;
use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::DocumentRecord;
use crate::models::IndexKind;
use crate::models::IndexRecord;
use crate::models::KnowledgeBaseConfig;
use crate::models::KNOWLEDGE_BASE_CONFIG_DOCUMENT_ID;
use crate::payload::normalize_index_item;
use crate::payload::parse_timestamp;

const DOCUMENT_ID_INDEX: &str = "DocumentIdIndex";

/// Shared SDK configuration for the configured region
pub async fn load_sdk_config(config: &AppConfig) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.storage.region.clone()))
        .load()
        .await
}

/// Search-index records in DynamoDB.
///
/// Items are written in the snake_case schema shared with earlier pipeline
/// stages; reads go through the boundary normalizer so both schemas load.
pub struct DynamoIndexStore {
    client: aws_sdk_dynamodb::Client,
    search_index_table: String,
    metadata_table: String,
}

impl DynamoIndexStore {
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &AppConfig) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(sdk_config),
            search_index_table: config.search_index_table().to_string(),
            metadata_table: config.storage.metadata_table.clone(),
        }
    }
}

fn attr_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| n.parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(n.clone())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::M(m) => Value::Object(item_to_json(m)),
        AttributeValue::L(l) => Value::Array(l.iter().map(attr_to_json).collect()),
        _ => Value::Null,
    }
}

fn item_to_json(item: &HashMap<String, AttributeValue>) -> Map<String, Value> {
    item.iter()
        .map(|(k, v)| (k.clone(), attr_to_json(v)))
        .collect()
}

/// Continuation tokens carry the last evaluated key as `{"name": {"S"|"N": value}}`
fn encode_key(key: &HashMap<String, AttributeValue>) -> String {
    let encoded: Map<String, Value> = key
        .iter()
        .filter_map(|(name, value)| {
            let (tag, raw) = match value {
                AttributeValue::S(s) => ("S", s),
                AttributeValue::N(n) => ("N", n),
                _ => return None,
            };
            let mut typed = Map::new();
            typed.insert(tag.to_string(), Value::String(raw.clone()));
            Some((name.clone(), Value::Object(typed)))
        })
        .collect();
    Value::Object(encoded).to_string()
}

fn decode_key(token: &str) -> Result<HashMap<String, AttributeValue>> {
    let parsed: Map<String, Value> = serde_json::from_str(token)
        .map_err(|e| DocRagError::StoreError(format!("Invalid continuation token: {e}")))?;

    let mut key = HashMap::new();
    for (name, typed) in parsed {
        let value = match (typed.get("S"), typed.get("N")) {
            (Some(Value::String(s)), _) => AttributeValue::S(s.clone()),
            (_, Some(Value::String(n))) => AttributeValue::N(n.clone()),
            _ => {
                return Err(DocRagError::StoreError(format!(
                    "Invalid continuation token attribute: {name}"
                )))
            }
        };
        key.insert(name, value);
    }
    Ok(key)
}

fn kind_tag(record: &IndexRecord) -> String {
    match (&record.kind, &record.entity_type) {
        (IndexKind::Entity, Some(entity_type)) => format!("entity_{entity_type}"),
        (kind, _) => kind.legacy_name().to_string(),
    }
}

fn record_to_item(record: &IndexRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(record.id.clone()));
    item.insert(
        "document_id".to_string(),
        AttributeValue::S(record.document_id.clone()),
    );
    item.insert("index_type".to_string(), AttributeValue::S(kind_tag(record)));
    item.insert(
        "index_value".to_string(),
        AttributeValue::S(record.value.clone()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(record.created_at.to_rfc3339()),
    );

    let optional = [
        ("image_s3_uri", &record.image_uri),
        ("extracted_image_s3_uri", &record.extracted_image_uri),
        ("image_description", &record.description),
        ("question", &record.question),
        ("answer", &record.answer),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
            item.insert(name.to_string(), AttributeValue::S(value.clone()));
        }
    }
    if let Some(position) = record.position {
        item.insert("position".to_string(), AttributeValue::N(position.to_string()));
    }
    item
}

fn document_to_item(id: &str, record: &DocumentRecord) -> HashMap<String, AttributeValue> {
    let strings = [
        ("id", id),
        ("document_id", record.document_id.as_str()),
        ("original_bucket", record.original_bucket.as_str()),
        ("original_key", record.original_key.as_str()),
        ("processed_bucket", record.processed_bucket.as_str()),
        ("processed_key", record.processed_key.as_str()),
        ("document_type", record.document_type.as_str()),
        ("title", record.title.as_str()),
        ("summary", record.summary.as_str()),
        ("category", record.category.as_str()),
        ("status", record.status.as_str()),
    ];
    let mut item: HashMap<String, AttributeValue> = strings
        .into_iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::S(value.to_string())))
        .collect();

    let flags = [
        ("has_text", record.has_text),
        ("has_tables", record.has_tables),
        ("has_forms", record.has_forms),
        ("is_image", record.is_image),
    ];
    for (name, value) in flags {
        item.insert(name.to_string(), AttributeValue::Bool(value));
    }
    item.insert(
        "topics".to_string(),
        AttributeValue::L(record.topics.iter().cloned().map(AttributeValue::S).collect()),
    );
    item.insert(
        "image_count".to_string(),
        AttributeValue::N(record.image_count.to_string()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(record.created_at.to_rfc3339()),
    );
    item.insert(
        "updated_at".to_string(),
        AttributeValue::S(record.updated_at.to_rfc3339()),
    );
    if let Some(kb_status) = &record.kb_status {
        item.insert("kb_status".to_string(), AttributeValue::S(kb_status.clone()));
    }
    if let Some(job_id) = &record.ingestion_job_id {
        item.insert("ingestion_job_id".to_string(), AttributeValue::S(job_id.clone()));
    }
    item
}

/// Items written by other pipeline stages may carry offset-less ISO timestamps
fn normalize_timestamps(item: &mut Map<String, Value>) {
    for field in ["created_at", "updated_at"] {
        let Some(Value::String(raw)) = item.get(field) else {
            item.insert(field.to_string(), Value::String(Utc::now().to_rfc3339()));
            continue;
        };
        let normalized = parse_timestamp(raw).unwrap_or_else(Utc::now).to_rfc3339();
        item.insert(field.to_string(), Value::String(normalized));
    }
}

impl DynamoIndexStore {
    async fn document_items(&self, document_id: &str) -> Result<Vec<HashMap<String, AttributeValue>>> {
        let output = self
            .client
            .query()
            .table_name(&self.metadata_table)
            .index_name(DOCUMENT_ID_INDEX)
            .key_condition_expression("document_id = :did")
            .expression_attribute_values(":did", AttributeValue::S(document_id.to_string()))
            .send()
            .await
            .map_err(|e| DocRagError::StoreError(format!("Metadata lookup for {document_id} failed: {e}")))?;
        Ok(output.items().to_vec())
    }
}

#[async_trait]
impl IndexStore for DynamoIndexStore {
    async fn scan_index_records(
        &self,
        kind: IndexKind,
        filter: ScanFilter,
        continuation: Option<String>,
    ) -> Result<RecordPage> {
        let mut expression = "#t IN (:legacy, :kind)".to_string();
        let mut request = self
            .client
            .scan()
            .table_name(&self.search_index_table)
            .expression_attribute_names("#t", "index_type")
            .expression_attribute_values(":legacy", AttributeValue::S(kind.legacy_name().to_string()))
            .expression_attribute_values(":kind", AttributeValue::S(kind.as_str().to_string()));

        if filter == ScanFilter::KindWithImage {
            expression.push_str(
                " AND ((attribute_exists(image_s3_uri) AND size(image_s3_uri) > :zero) \
                 OR (attribute_exists(extracted_image_s3_uri) AND size(extracted_image_s3_uri) > :zero))",
            );
            request = request.expression_attribute_values(":zero", AttributeValue::N("0".to_string()));
        }

        if let Some(token) = continuation {
            request = request.set_exclusive_start_key(Some(decode_key(&token)?));
        }

        let output = request
            .filter_expression(expression)
            .send()
            .await
            .map_err(|e| DocRagError::StoreError(format!("Scan of {kind} failed: {e}")))?;

        let mut records = Vec::new();
        for item in output.items() {
            let json = Value::Object(item_to_json(item));
            match normalize_index_item(&json) {
                Some(record) => records.push(record),
                None => warn!("Skipping malformed {} item from {}", kind, self.search_index_table),
            }
        }

        let continuation = output.last_evaluated_key().map(encode_key);
        debug!(
            "Scanned {} {} records from {} (more: {})",
            records.len(),
            kind,
            self.search_index_table,
            continuation.is_some()
        );

        Ok(RecordPage {
            records,
            continuation,
        })
    }

    async fn put_index_record(&self, record: &IndexRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.search_index_table)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map_err(|e| DocRagError::StoreError(format!("Failed to store index record: {e}")))?;
        Ok(())
    }

    async fn knowledge_base_config(&self) -> Result<Option<KnowledgeBaseConfig>> {
        let output = self
            .client
            .query()
            .table_name(&self.metadata_table)
            .index_name(DOCUMENT_ID_INDEX)
            .key_condition_expression("document_id = :did")
            .expression_attribute_values(
                ":did",
                AttributeValue::S(KNOWLEDGE_BASE_CONFIG_DOCUMENT_ID.to_string()),
            )
            .send()
            .await
            .map_err(|e| DocRagError::StoreError(format!("Knowledge base lookup failed: {e}")))?;

        let Some(item) = output.items().first() else {
            return Ok(None);
        };
        let config = serde_json::from_value(Value::Object(item_to_json(item)))?;
        Ok(Some(config))
    }

    async fn put_knowledge_base_config(&self, config: &KnowledgeBaseConfig) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.client
            .put_item()
            .table_name(&self.metadata_table)
            .item("id", AttributeValue::S(Uuid::new_v4().to_string()))
            .item(
                "document_id",
                AttributeValue::S(KNOWLEDGE_BASE_CONFIG_DOCUMENT_ID.to_string()),
            )
            .item(
                "knowledge_base_id",
                AttributeValue::S(config.knowledge_base_id.clone()),
            )
            .item("data_source_id", AttributeValue::S(config.data_source_id.clone()))
            .item("created_at", AttributeValue::S(now.clone()))
            .item("updated_at", AttributeValue::S(now))
            .item("status", AttributeValue::S("CREATED".to_string()))
            .send()
            .await
            .map_err(|e| DocRagError::StoreError(format!("Failed to store knowledge base config: {e}")))?;
        Ok(())
    }

    async fn document_record(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        let items = self.document_items(document_id).await?;
        let Some(item) = items.first() else {
            return Ok(None);
        };
        let mut json = item_to_json(item);
        normalize_timestamps(&mut json);
        Ok(Some(serde_json::from_value(Value::Object(json))?))
    }

    /// Overwrites the existing item for the document, keeping its primary key
    async fn put_document_record(&self, record: &DocumentRecord) -> Result<()> {
        let existing_id = self
            .document_items(&record.document_id)
            .await?
            .first()
            .and_then(|item| item.get("id"))
            .and_then(|id| id.as_s().ok())
            .cloned();
        let id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        self.client
            .put_item()
            .table_name(&self.metadata_table)
            .set_item(Some(document_to_item(&id, record)))
            .send()
            .await
            .map_err(|e| {
                DocRagError::StoreError(format!(
                    "Failed to store metadata for {}: {e}",
                    record.document_id
                ))
            })?;
        debug!("Stored metadata item {} for {}", id, record.document_id);
        Ok(())
    }
}

/// S3 objects with presigned GET URLs
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    region: String,
}

impl S3BlobStore {
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &AppConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
            region: config.storage.region.clone(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn sign_access_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| DocRagError::BlobError(format!("Invalid presigning TTL: {e}")))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| DocRagError::BlobError(format!("Failed to presign s3://{bucket}/{key}: {e}")))?;

        Ok(request.uri().to_string())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| DocRagError::BlobError(format!("Failed to get s3://{bucket}/{key}: {e}")))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| DocRagError::BlobError(format!("Failed to read s3://{bucket}/{key}: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| DocRagError::BlobError(format!("Failed to put s3://{bucket}/{key}: {e}")))?;
        Ok(())
    }

    fn direct_url(&self, bucket: &str, key: &str) -> Option<String> {
        Some(format!(
            "https://{bucket}.s3.{}.amazonaws.com/{key}",
            self.region
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_key_roundtrip() {
        let mut key = HashMap::new();
        key.insert("id".to_string(), AttributeValue::S("abc".to_string()));
        key.insert("position".to_string(), AttributeValue::N("4".to_string()));

        let decoded = decode_key(&encode_key(&key)).unwrap();
        assert_eq!(decoded, key);
        assert!(decode_key("not json").is_err());
    }

    #[test]
    fn test_record_item_uses_shared_schema() {
        let record = IndexRecord::new("doc", IndexKind::Entity, "Acme")
            .with_entity_type("organizations")
            .with_position(2);
        let item = record_to_item(&record);
        assert_eq!(
            item.get("index_type"),
            Some(&AttributeValue::S("entity_organizations".to_string()))
        );
        assert_eq!(item.get("position"), Some(&AttributeValue::N("2".to_string())));
        assert!(!item.contains_key("image_s3_uri"));

        let back = normalize_index_item(&Value::Object(item_to_json(&item))).unwrap();
        assert_eq!(back.entity_type.as_deref(), Some("organizations"));
        assert_eq!(back.position, Some(2));
    }

    #[test]
    fn test_document_item_reads_back_with_job_id() {
        let mut record: DocumentRecord = serde_json::from_value(serde_json::json!({
            "documentId": "manual",
            "processedBucket": "processed",
            "processedKey": "docs/manual.json",
            "status": "PROCESSED",
            "createdAt": "2026-01-02T03:04:05Z",
            "updatedAt": "2026-01-02T03:04:05Z"
        }))
        .unwrap();
        record.kb_status = Some("INGESTING".to_string());
        record.ingestion_job_id = Some("JOB42".to_string());

        let item = document_to_item("item-1", &record);
        assert_eq!(item.get("id"), Some(&AttributeValue::S("item-1".to_string())));

        let mut json = item_to_json(&item);
        normalize_timestamps(&mut json);
        let back: DocumentRecord = serde_json::from_value(Value::Object(json)).unwrap();
        assert_eq!(back.ingestion_job_id.as_deref(), Some("JOB42"));
        assert_eq!(back.processed_key, "docs/manual.json");
    }

    #[test]
    fn test_offsetless_timestamps_are_normalized() {
        let mut json = Map::new();
        json.insert(
            "created_at".to_string(),
            Value::String("2026-01-02T03:04:05.123456".to_string()),
        );
        normalize_timestamps(&mut json);
        assert_eq!(
            json.get("created_at").and_then(Value::as_str),
            Some("2026-01-02T03:04:05.123456+00:00")
        );
        assert!(json.contains_key("updated_at"));
    }
}
