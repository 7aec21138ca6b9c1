//! Document ingestion: extraction, metadata, image descriptions and index records

pub mod describe;
pub mod extract;
pub mod indexer;
pub mod knowledge_base;
pub mod metadata;
pub mod pipeline;
pub mod processed;
#[cfg(feature = "aws")]
pub mod textract;

pub use describe::find_associated_qa;
pub use describe::ImageDescriber;
pub use extract::extract_document;
pub use extract::file_extension;
pub use extract::BlobTextExtractor;
pub use extract::TextExtractor;
pub use indexer::build_index_records;
pub use indexer::DocumentIndexer;
pub use indexer::IndexSummary;
pub use knowledge_base::initialize_knowledge_base;
pub use knowledge_base::sync_knowledge_base;
pub use metadata::extract_metadata;
pub use metadata::parse_metadata;
pub use pipeline::DocumentIngestor;
pub use pipeline::IngestOptions;
pub use pipeline::IngestReport;
pub use processed::load_processed_document;
pub use processed::save_processed_document;

/// Key of the processed JSON for an uploaded object: extension swapped for `.json`
pub fn processed_key(original_key: &str) -> String {
    format!("{}.json", strip_extension(original_key))
}

/// Document id for an uploaded object: file name without its extension
pub fn document_id_from_key(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    strip_extension(file_name).to_string()
}

fn strip_extension(key: &str) -> &str {
    let name_start = key.rfind('/').map_or(0, |i| i + 1);
    match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &key[..name_start + dot],
        _ => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_key_swaps_extension() {
        assert_eq!(processed_key("uploads/report.pdf"), "uploads/report.json");
        assert_eq!(processed_key("scan.final.PNG"), "scan.final.json");
        assert_eq!(processed_key("v1.2/notes"), "v1.2/notes.json");
        assert_eq!(processed_key(".hidden"), ".hidden.json");
    }

    #[test]
    fn test_document_id_from_key() {
        assert_eq!(document_id_from_key("uploads/2024/report.pdf"), "report");
        assert_eq!(document_id_from_key("photo.jpeg"), "photo");
        assert_eq!(document_id_from_key("dir.v2/readme"), "readme");
    }
}
