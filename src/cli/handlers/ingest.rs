//! Upload ingestion and knowledge-base setup from the command line

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::capabilities::Capabilities;
use crate::capabilities::Collaborators;
use crate::capabilities::StorageBackend;
use crate::cli::output::*;
use crate::errors::DocRagError;
use crate::ingest::initialize_knowledge_base;
use crate::ingest::DocumentIngestor;
use crate::ingest::IngestOptions;
use crate::models::KnowledgeBaseConfig;
use crate::storage::BlobStore;
use crate::storage::KeywordKnowledgeBase;
use crate::storage::KnowledgeBase;
use crate::storage::MemoryIndexStore;
use crate::storage::S3Location;
use crate::storage::Snapshot;
use crate::AppConfig;
use crate::Result;

/// Bucket local files are uploaded to before ingestion
pub const UPLOAD_BUCKET: &str = "uploads";

fn content_type_for(key: &str) -> &'static str {
    match crate::ingest::file_extension(key).as_str() {
        ".pdf" => "application/pdf",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".tif" | ".tiff" => "image/tiff",
        ".json" => "application/json",
        ".txt" | ".md" | ".csv" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Resolve `source` to a blob location, uploading local files first
async fn source_location(blobs: &dyn BlobStore, source: &str) -> Result<S3Location> {
    if source.trim().starts_with("s3://") {
        return S3Location::parse(source).ok_or_else(|| {
            DocRagError::InvalidInput(format!("Not an s3://bucket/key locator: {source}"))
        });
    }

    let path = Path::new(source);
    let key = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| DocRagError::InvalidInput(format!("No file name in {source}")))?;
    let body = tokio::fs::read(path).await?;
    blobs
        .put_object(UPLOAD_BUCKET, &key, body, content_type_for(&key))
        .await?;
    info!("⬆️  Uploaded {} to s3://{}/{}", path.display(), UPLOAD_BUCKET, key);
    Ok(S3Location {
        bucket: UPLOAD_BUCKET.to_string(),
        key,
    })
}

/// Extract, save, index and sync one upload.
///
/// `source` is an `s3://bucket/key` locator or a local file. With the memory
/// backend the index records, document record and passages are written back
/// to the snapshot file.
pub async fn handle_ingest_command(
    config: &AppConfig,
    source: &str,
    extract_metadata: bool,
    describe_images: bool,
) -> Result<()> {
    let capabilities = Capabilities::resolve(config);
    let mut collaborators = Collaborators::build(config, &capabilities).await?;
    let options = IngestOptions {
        extract_metadata,
        describe_images,
        ..IngestOptions::from_config(config)
    };

    let location = source_location(collaborators.blobs.as_ref(), source).await?;
    print_info(&format!("Ingesting {}", location.uri()));

    let report = match capabilities.storage {
        StorageBackend::Memory => {
            let path = &config.storage.snapshot_path;
            let snapshot = Snapshot::load_or_empty(path)?;
            let store = Arc::new(MemoryIndexStore::from_snapshot(&snapshot));
            let keyword_kb = Arc::new(KeywordKnowledgeBase::new(snapshot.passages));
            collaborators.index_store = store.clone();
            if collaborators.knowledge_base.name() == "keyword" {
                collaborators.knowledge_base = keyword_kb.clone();
            }

            let ingestor = DocumentIngestor::new(&collaborators, capabilities.knowledge_base.clone(), options);
            let report = ingestor.ingest_object(&location.bucket, &location.key).await?;

            Snapshot::capture(&store, &keyword_kb).await?.save(path)?;
            info!("💾 Saved snapshot to {}", path);
            report
        }
        StorageBackend::Aws => {
            DocumentIngestor::new(&collaborators, capabilities.knowledge_base.clone(), options)
                .ingest_object(&location.bucket, &location.key)
                .await?
        }
    };

    print_ingest_report(&report);
    Ok(())
}

/// Store knowledge-base identifiers, defaulting to the configured ones
pub async fn handle_init_kb_command(
    config: &AppConfig,
    knowledge_base_id: Option<String>,
    data_source_id: Option<String>,
) -> Result<()> {
    let kb_config = KnowledgeBaseConfig {
        knowledge_base_id: knowledge_base_id.unwrap_or_else(|| config.knowledge_base.id.clone()),
        data_source_id: data_source_id.unwrap_or_else(|| config.knowledge_base.data_source_id.clone()),
    };

    let capabilities = Capabilities::resolve(config);
    let created = match capabilities.storage {
        StorageBackend::Memory => {
            let path = &config.storage.snapshot_path;
            let mut snapshot = Snapshot::load_or_empty(path)?;
            let store = MemoryIndexStore::from_snapshot(&snapshot);
            let created = initialize_knowledge_base(&store, &kb_config).await?;
            if created {
                snapshot.knowledge_base = Some(kb_config.clone());
                snapshot.save(path)?;
            }
            created
        }
        StorageBackend::Aws => {
            let collaborators = Collaborators::build(config, &capabilities).await?;
            initialize_knowledge_base(collaborators.index_store.as_ref(), &kb_config).await?
        }
    };

    if created {
        print_success(&format!(
            "Knowledge base {} stored (data source {})",
            kb_config.knowledge_base_id, kb_config.data_source_id
        ));
    } else {
        print_info(&format!(
            "Knowledge base {} already initialized",
            kb_config.knowledge_base_id
        ));
    }
    Ok(())
}
