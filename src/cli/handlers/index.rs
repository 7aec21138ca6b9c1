//! Document indexing from the command line

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::capabilities::Capabilities;
use crate::capabilities::Collaborators;
use crate::capabilities::StorageBackend;
use crate::cli::output::*;
use crate::ingest::document_id_from_key;
use crate::ingest::extract_metadata;
use crate::ingest::DocumentIndexer;
use crate::ingest::ImageDescriber;
use crate::models::ProcessedDocument;
use crate::storage::MemoryIndexStore;
use crate::storage::Snapshot;
use crate::AppConfig;
use crate::Result;

/// Index a processed document file.
///
/// With the memory backend the new records are appended to the snapshot file
/// so later `query` runs see them.
pub async fn handle_index_command(
    config: &AppConfig,
    file: &Path,
    with_metadata: bool,
    describe_images: bool,
) -> Result<()> {
    let body = tokio::fs::read(file).await?;
    let mut document: ProcessedDocument = serde_json::from_slice(&body)?;
    if document.document_id.trim().is_empty() {
        let key = if document.original_key.is_empty() {
            file.display().to_string()
        } else {
            document.original_key.clone()
        };
        document.document_id = document_id_from_key(&key);
    }
    print_info(&format!("Indexing document {}", document.document_id));

    let capabilities = Capabilities::resolve(config);
    let collaborators = Collaborators::build(config, &capabilities).await?;

    if with_metadata {
        document.metadata =
            extract_metadata(collaborators.generator.as_ref(), &document.document_content).await;
        print_info(&format!("Title: {}", document.metadata.title));
    }

    if describe_images {
        let describer = ImageDescriber::new(
            collaborators.generator.clone(),
            collaborators.blobs.clone(),
        );
        let described = describer.describe_document(&mut document).await;
        print_info(&format!("Described {described} images"));
    }

    let summary = match capabilities.storage {
        StorageBackend::Memory => {
            let path = &config.storage.snapshot_path;
            let mut snapshot = Snapshot::load_or_empty(path)?;
            let summary = DocumentIndexer::new(Arc::new(MemoryIndexStore::default()))
                .index(&document)
                .await?;
            snapshot.append_records(&summary.records)?;
            snapshot.save(path)?;
            info!("💾 Saved {} records to {}", summary.records_written, path);
            summary
        }
        StorageBackend::Aws => {
            DocumentIndexer::new(collaborators.index_store.clone())
                .index(&document)
                .await?
        }
    };

    print_index_summary(&summary);
    Ok(())
}
