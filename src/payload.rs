//! Boundary normalization for upstream payloads
//!
//! Every heterogeneous shape the pipeline receives is turned into a typed
//! value here, once: index items in either the camelCase or the legacy
//! snake_case schema, step events carrying processed-document locations,
//! and payloads that were too large to pass inline and live in the blob
//! store behind a [`PayloadReference`].

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::IndexKind;
use crate::models::IndexRecord;
use crate::models::PayloadReference;
use crate::models::QaPair;
use crate::storage::BlobStore;
use crate::text::truncate_chars;

/// Where a processed document lives, as carried between pipeline steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedLocation {
    pub processed_bucket: String,
    pub processed_key: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_id: Option<String>,
}

/// A value delivered inline or, when oversized, by reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delivered<T> {
    Reference {
        #[serde(rename = "payloadReference")]
        payload_reference: PayloadReference,
    },
    Inline(T),
}

impl<T> Delivered<T> {
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Delivered::Reference { .. })
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match obj.get(*name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn integer_field(obj: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    match field(obj, names)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// RFC 3339, or ISO 8601 without an offset read as UTC
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Turn a stored index item into an [`IndexRecord`].
///
/// Returns `None` for items that lack a document id or carry an unknown
/// kind tag; callers log and skip those.
pub fn normalize_index_item(item: &Value) -> Option<IndexRecord> {
    let obj = item.as_object()?;

    let document_id = string_field(obj, &["documentId", "document_id"])?;
    let tag = string_field(obj, &["kind", "indexType", "index_type"])?;
    let (kind, tagged_entity) = IndexKind::parse_tagged(&tag)?;

    let value = string_field(obj, &["value", "indexValue", "index_value"]).unwrap_or_default();

    let nested_qa = field(obj, &["associatedQa", "associated_qa"])
        .and_then(|v| serde_json::from_value::<QaPair>(v.clone()).ok());

    let question = string_field(obj, &["question"])
        .or_else(|| nested_qa.as_ref().map(|qa| qa.question.clone()));
    let answer = string_field(obj, &["answer"])
        .or_else(|| nested_qa.as_ref().map(|qa| qa.answer.clone()));

    let created_at = string_field(obj, &["createdAt", "created_at"])
        .and_then(|raw| parse_timestamp(&raw))
        .unwrap_or_default();

    Some(IndexRecord {
        id: string_field(obj, &["id"]).unwrap_or_else(|| Uuid::new_v4().to_string()),
        document_id,
        kind,
        entity_type: string_field(obj, &["entityType", "entity_type"]).or(tagged_entity),
        value: truncate_chars(&value, crate::models::MAX_INDEX_VALUE_CHARS).to_string(),
        image_uri: string_field(obj, &["imageUri", "imageS3Uri", "image_s3_uri"]),
        extracted_image_uri: string_field(
            obj,
            &["extractedImageUri", "extractedImageS3Uri", "extracted_image_s3_uri"],
        ),
        description: string_field(obj, &["description", "imageDescription", "image_description"]),
        position: integer_field(obj, &["position", "imagePosition", "image_position"]),
        question,
        answer,
        created_at,
    })
}

/// Normalize a batch, skipping malformed items with a warning
pub fn normalize_index_items(items: &[Value]) -> Vec<IndexRecord> {
    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match normalize_index_item(item) {
            Some(record) => records.push(record),
            None => warn!("Skipping malformed index item #{}: {}", idx, item),
        }
    }
    records
}

fn location_from(obj: &Map<String, Value>, metadata_id_keys: &[&str]) -> Option<ProcessedLocation> {
    let processed_bucket = string_field(obj, &["processedBucket", "processed_bucket"])?;
    let processed_key = string_field(obj, &["processedKey", "processed_key"])?;
    Some(ProcessedLocation {
        processed_bucket,
        processed_key,
        document_id: string_field(obj, &["documentId", "document_id"])
            .unwrap_or_else(|| "unknown".to_string()),
        metadata_id: string_field(obj, metadata_id_keys),
    })
}

/// Find the processed-document location in a step event.
///
/// Tried in order: a nested `metadata` object, fields on the event itself,
/// then a JSON-encoded string `body`.
pub fn normalize_event(event: &Value) -> Option<ProcessedLocation> {
    let obj = event.as_object()?;

    if let Some(Value::Object(metadata)) = obj.get("metadata") {
        if let Some(location) = location_from(metadata, &["id", "metadataId", "metadata_id"]) {
            return Some(location);
        }
    }

    if let Some(location) = location_from(obj, &["metadataId", "metadata_id"]) {
        return Some(location);
    }

    if let Some(Value::String(body)) = obj.get("body") {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(body_obj)) => {
                return location_from(&body_obj, &["metadataId", "metadata_id"]);
            }
            Ok(_) => debug!("Event body is not a JSON object"),
            Err(e) => debug!("Event body is not valid JSON: {}", e),
        }
    }

    None
}

fn reference_in(event: &Value) -> Option<PayloadReference> {
    let raw = event
        .get("payloadReference")
        .or_else(|| event.get("payload_reference"))?;
    serde_json::from_value(raw.clone()).ok()
}

/// Resolve a step event to a processed-document location, loading the
/// referenced payload first when the event only carries a reference
pub async fn resolve_event(blobs: &dyn BlobStore, event: &Value) -> Result<ProcessedLocation> {
    let loaded;
    let source = match reference_in(event) {
        Some(reference) => {
            if reference.bucket.is_empty() || reference.key.is_empty() {
                return Err(DocRagError::InvalidInput(
                    "Missing bucket or key in payload reference".to_string(),
                ));
            }
            loaded = dereference::<Value>(blobs, &reference).await?;
            &loaded
        }
        None => event,
    };

    normalize_event(source).ok_or_else(|| {
        DocRagError::InvalidInput(
            "Could not find processed_bucket and processed_key in event".to_string(),
        )
    })
}

/// Blob key for an overflow payload written on `date`
pub fn payload_key(date: NaiveDate) -> String {
    format!("payloads/{}/{}.json", date.format("%Y-%m-%d"), Uuid::new_v4())
}

/// Serialize `value`; when larger than `threshold_bytes`, write it to
/// `bucket` and hand back a reference instead
pub async fn store_if_oversized<T: Serialize>(
    blobs: &dyn BlobStore,
    bucket: &str,
    value: T,
    threshold_bytes: usize,
) -> Result<Delivered<T>> {
    let body = serde_json::to_vec(&value)?;
    if body.len() <= threshold_bytes {
        return Ok(Delivered::Inline(value));
    }

    if bucket.is_empty() {
        return Err(DocRagError::MissingConfiguration(
            "storage.payload_bucket is required for oversized payloads".to_string(),
        ));
    }

    let key = payload_key(Utc::now().date_naive());
    let size = body.len();
    blobs.put_object(bucket, &key, body, "application/json").await?;
    info!("📦 Stored {} byte payload at s3://{}/{}", size, bucket, key);

    Ok(Delivered::Reference {
        payload_reference: PayloadReference {
            bucket: bucket.to_string(),
            key,
        },
    })
}

/// Load and decode a payload stored by [`store_if_oversized`]
pub async fn dereference<T: DeserializeOwned>(
    blobs: &dyn BlobStore,
    reference: &PayloadReference,
) -> Result<T> {
    let body = blobs.get_object(&reference.bucket, &reference.key).await?;
    let value = serde_json::from_slice(&body)?;
    debug!(
        "Loaded payload from s3://{}/{}",
        reference.bucket, reference.key
    );
    Ok(value)
}
