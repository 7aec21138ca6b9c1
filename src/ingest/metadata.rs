//! LLM-generated document metadata

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::llm::DocumentPrompts;
use crate::llm::TextGenerator;
use crate::models::DocumentContent;
use crate::models::DocumentMetadata;
use crate::text::truncate_chars;

/// Only the start of a document is sent for metadata extraction
pub const METADATA_TEXT_CHARS: usize = 2000;

pub fn metadata_prompt(content: &DocumentContent) -> String {
    DocumentPrompts::extract_metadata().render(&[
        ("text", truncate_chars(&content.text_content, METADATA_TEXT_CHARS)),
        ("document_type", content.document_type.as_str()),
        ("is_image", if content.is_image { "true" } else { "false" }),
    ])
}

/// Ask the generator for metadata; any failure yields the defaults
pub async fn extract_metadata(
    generator: &dyn TextGenerator,
    content: &DocumentContent,
) -> DocumentMetadata {
    match generator.generate_text(&metadata_prompt(content), None).await {
        Ok(completion) => parse_metadata(&completion),
        Err(e) => {
            warn!("⚠️  Metadata generation failed, using defaults: {}", e);
            DocumentMetadata::default()
        }
    }
}

/// Pull the JSON object out of a completion (first `{` to last `}`).
///
/// Fields are read leniently; anything missing or mistyped keeps its default.
pub fn parse_metadata(completion: &str) -> DocumentMetadata {
    let Some(value) = json_object(completion) else {
        warn!("No JSON object in metadata completion, using defaults");
        return DocumentMetadata::default();
    };

    let mut metadata = DocumentMetadata::default();
    if let Some(title) = non_empty_str(&value, "title") {
        metadata.title = title;
    }
    if let Some(summary) = non_empty_str(&value, "summary") {
        metadata.summary = summary;
    }
    if let Some(category) = non_empty_str(&value, "category") {
        metadata.category = category;
    }
    metadata.topics = string_list(value.get("topics"));
    metadata.image_description =
        non_empty_str(&value, "imageDescription").or_else(|| non_empty_str(&value, "image_description"));

    if let Some(Value::Object(entities)) = value.get("entities") {
        metadata.entities = entities
            .iter()
            .map(|(kind, names)| (kind.clone(), string_list(Some(names))))
            .filter(|(_, names)| !names.is_empty())
            .collect::<BTreeMap<_, _>>();
    }

    debug!(
        "Parsed metadata '{}' with {} topics",
        metadata.title,
        metadata.topics.len()
    );
    metadata
}

fn json_object(completion: &str) -> Option<Value> {
    let start = completion.find('{')?;
    let end = completion.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&completion[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => None,
        Err(e) => {
            warn!("Metadata completion is not valid JSON: {}", e);
            None
        }
    }
}

fn non_empty_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Array of strings, or a single string, as a list
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
