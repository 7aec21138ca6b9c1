//! Knowledge-base setup and per-document sync

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::errors::DocRagError;
use crate::errors::Result;
use crate::models::KnowledgeBaseConfig;
use crate::models::KnowledgeBaseSync;
use crate::models::ProcessedDocument;
use crate::storage::IndexStore;
use crate::storage::KnowledgeBase;

/// Store the knowledge-base identifiers under the reserved config document.
///
/// Returns `false` when the same identifiers were already stored.
///
/// # Errors
/// - `InvalidInput` for a blank knowledge base id
/// - Index store errors
pub async fn initialize_knowledge_base(
    store: &dyn IndexStore,
    config: &KnowledgeBaseConfig,
) -> Result<bool> {
    if config.knowledge_base_id.trim().is_empty() {
        return Err(DocRagError::InvalidInput(
            "Knowledge base ID must not be empty".to_string(),
        ));
    }
    if config.data_source_id.trim().is_empty() {
        warn!("⚠️  Knowledge base {} has no data source; remote ingestion will fail", config.knowledge_base_id);
    }

    if store.knowledge_base_config().await?.as_ref() == Some(config) {
        info!("Knowledge base {} already initialized", config.knowledge_base_id);
        return Ok(false);
    }

    store.put_knowledge_base_config(config).await?;
    info!(
        "✅ Stored knowledge base {} (data source {})",
        config.knowledge_base_id, config.data_source_id
    );
    Ok(true)
}

/// Add a processed document to the knowledge base and note the outcome on
/// its document record.
///
/// # Errors
/// - `MissingConfiguration` when no knowledge base is configured or stored
/// - Knowledge base and index store errors
pub async fn sync_knowledge_base(
    store: &dyn IndexStore,
    knowledge_base: &dyn KnowledgeBase,
    configured: Option<&KnowledgeBaseConfig>,
    document: &ProcessedDocument,
) -> Result<KnowledgeBaseSync> {
    let config = match configured {
        Some(config) => config.clone(),
        None => store
            .knowledge_base_config()
            .await?
            .filter(|config| !config.knowledge_base_id.trim().is_empty())
            .ok_or_else(|| {
                DocRagError::MissingConfiguration(
                    "Knowledge base ID not found in configuration".to_string(),
                )
            })?,
    };
    debug!(
        "Adding {} to {} knowledge base {}",
        document.document_id,
        knowledge_base.name(),
        config.knowledge_base_id
    );

    let sync = knowledge_base.add_document(document).await?;

    match store.document_record(&document.document_id).await? {
        Some(mut record) => {
            record.record_sync(&sync);
            store.put_document_record(&record).await?;
        }
        None => warn!(
            "No document record for {}, knowledge base status not stored",
            document.document_id
        ),
    }
    Ok(sync)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::DocumentContent;
    use crate::models::DocumentRecord;
    use crate::storage::KeywordKnowledgeBase;
    use crate::storage::MemoryIndexStore;

    fn kb_config() -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            knowledge_base_id: "kb-1".to_string(),
            data_source_id: "ds-1".to_string(),
        }
    }

    fn document() -> ProcessedDocument {
        ProcessedDocument {
            document_id: "manual".to_string(),
            original_bucket: "uploads".to_string(),
            original_key: "manual.txt".to_string(),
            document_content: DocumentContent {
                text_content: "Warranty lasts two years.".to_string(),
                ..DocumentContent::default()
            },
            metadata: Default::default(),
            qa_pairs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_initialize_stores_config_once() {
        let store = MemoryIndexStore::default();
        assert!(initialize_knowledge_base(&store, &kb_config()).await.unwrap());
        assert!(!initialize_knowledge_base(&store, &kb_config()).await.unwrap());
        assert_eq!(store.knowledge_base_config().await.unwrap(), Some(kb_config()));

        let blank = KnowledgeBaseConfig {
            knowledge_base_id: " ".to_string(),
            data_source_id: String::new(),
        };
        let err = initialize_knowledge_base(&store, &blank).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_sync_needs_a_knowledge_base() {
        let store = MemoryIndexStore::default();
        let kb = KeywordKnowledgeBase::new(Vec::new());
        let err = sync_knowledge_base(&store, &kb, None, &document())
            .await
            .unwrap_err();
        assert!(matches!(err, DocRagError::MissingConfiguration(_)));
        assert!(kb.passages().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_records_status_on_document() {
        let store = Arc::new(MemoryIndexStore::default());
        initialize_knowledge_base(store.as_ref(), &kb_config()).await.unwrap();
        store
            .put_document_record(&DocumentRecord::processed(&document(), "processed", "manual.json"))
            .await
            .unwrap();
        let kb = KeywordKnowledgeBase::new(Vec::new());

        let sync = sync_knowledge_base(store.as_ref(), &kb, None, &document())
            .await
            .unwrap();
        assert_eq!(sync, KnowledgeBaseSync::Indexed { passages: 1 });

        let record = store.document_record("manual").await.unwrap().unwrap();
        assert_eq!(record.kb_status.as_deref(), Some("INDEXED"));
        assert!(record.ingestion_job_id.is_none());
        assert_eq!(kb.search("warranty", 3).await.unwrap().len(), 1);
    }
}
