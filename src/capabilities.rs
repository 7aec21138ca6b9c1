//! One-time resolution of which collaborator backends are usable
//!
//! [`Capabilities::resolve`] inspects configuration (and compiled features)
//! once at startup and records every fallback it takes. The resulting
//! descriptor is passed explicitly into [`Collaborators::build`] and the
//! answer service; nothing is resolved lazily or held globally.

use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::ingest::BlobTextExtractor;
use crate::ingest::TextExtractor;
use crate::llm::DisabledGenerator;
use crate::llm::LlmProvider;
use crate::llm::LlmService;
use crate::llm::TextGenerator;
use crate::models::KnowledgeBaseConfig;
use crate::storage::BlobStore;
use crate::storage::HttpKnowledgeBase;
use crate::storage::IndexStore;
use crate::storage::KeywordKnowledgeBase;
use crate::storage::KnowledgeBase;
use crate::storage::MemoryBlobStore;
use crate::storage::MemoryIndexStore;
use crate::storage::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorBackend {
    OpenAI,
    Ollama,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    Keyword,
    Vector { endpoint: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Aws,
}

/// Resolved backends and feature flags
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub generator: GeneratorBackend,
    pub search: SearchBackend,
    pub storage: StorageBackend,
    pub qa_aware_scoring: bool,
    /// From configuration; `None` means look it up in the index store
    pub knowledge_base: Option<KnowledgeBaseConfig>,
    /// Human-readable notes for every fallback taken
    pub fallbacks: Vec<String>,
}

impl Capabilities {
    pub fn resolve(config: &AppConfig) -> Self {
        let mut fallbacks = Vec::new();

        let generator = resolve_generator(config, &mut fallbacks);
        let search = resolve_search(config, &mut fallbacks);
        let storage = resolve_storage(config, &mut fallbacks);

        let knowledge_base = (!config.knowledge_base.id.trim().is_empty()).then(|| {
            KnowledgeBaseConfig {
                knowledge_base_id: config.knowledge_base.id.clone(),
                data_source_id: config.knowledge_base.data_source_id.clone(),
            }
        });

        for note in &fallbacks {
            warn!("⚠️  {}", note);
        }

        let capabilities = Self {
            generator,
            search,
            storage,
            qa_aware_scoring: config.retrieval.qa_aware_scoring,
            knowledge_base,
            fallbacks,
        };
        info!("{}", capabilities.summary());
        capabilities
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let search = match &self.search {
            SearchBackend::Keyword => "keyword",
            SearchBackend::Vector { .. } => "vector",
        };
        format!(
            "Capabilities: generator={:?}, search={}, storage={:?}, qa_aware={}",
            self.generator, search, self.storage, self.qa_aware_scoring
        )
    }
}

fn resolve_generator(config: &AppConfig, fallbacks: &mut Vec<String>) -> GeneratorBackend {
    let endpoint = config.llm_endpoint().trim();
    if endpoint.is_empty() {
        fallbacks.push("No LLM endpoint configured, text generation disabled".to_string());
        return GeneratorBackend::Disabled;
    }
    if url::Url::parse(endpoint).is_err() {
        fallbacks.push(format!(
            "LLM endpoint '{endpoint}' is not a valid URL, text generation disabled"
        ));
        return GeneratorBackend::Disabled;
    }

    match LlmProvider::detect(endpoint, config.llm_key()) {
        LlmProvider::Ollama => GeneratorBackend::Ollama,
        LlmProvider::OpenAI if config.llm_key().trim().is_empty() => {
            fallbacks.push("OpenAI-compatible endpoint without an API key, text generation disabled".to_string());
            GeneratorBackend::Disabled
        }
        LlmProvider::OpenAI => GeneratorBackend::OpenAI,
    }
}

fn resolve_search(config: &AppConfig, fallbacks: &mut Vec<String>) -> SearchBackend {
    let kb = &config.knowledge_base;
    match kb.search_backend.trim() {
        "vector" => {
            let endpoint = kb.retrieve_endpoint.trim();
            if endpoint.is_empty() {
                fallbacks.push(
                    "Vector search requested without knowledge_base.retrieve_endpoint, using keyword search"
                        .to_string(),
                );
                SearchBackend::Keyword
            } else {
                SearchBackend::Vector {
                    endpoint: endpoint.to_string(),
                }
            }
        }
        "keyword" => SearchBackend::Keyword,
        other => {
            fallbacks.push(format!("Unknown search backend '{other}', using keyword search"));
            SearchBackend::Keyword
        }
    }
}

fn resolve_storage(config: &AppConfig, fallbacks: &mut Vec<String>) -> StorageBackend {
    match config.storage.backend.trim() {
        "aws" if cfg!(feature = "aws") => StorageBackend::Aws,
        "aws" => {
            fallbacks.push(
                "AWS storage requested but built without the `aws` feature, using memory storage"
                    .to_string(),
            );
            StorageBackend::Memory
        }
        "memory" => StorageBackend::Memory,
        other => {
            fallbacks.push(format!("Unknown storage backend '{other}', using memory storage"));
            StorageBackend::Memory
        }
    }
}

/// Live collaborator handles for the resolved capabilities
#[derive(Clone)]
pub struct Collaborators {
    pub index_store: Arc<dyn IndexStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub knowledge_base: Arc<dyn KnowledgeBase>,
    pub generator: Arc<dyn TextGenerator>,
    pub extractor: Arc<dyn TextExtractor>,
}

/// Storage-side handles of one backend
type StorageHandles = (Arc<dyn IndexStore>, Arc<dyn BlobStore>, Arc<dyn TextExtractor>);

impl Collaborators {
    /// # Errors
    /// - Snapshot read/parse errors for the memory backend
    /// - HTTP client build errors for remote collaborators
    pub async fn build(config: &AppConfig, capabilities: &Capabilities) -> Result<Self> {
        let snapshot = Snapshot::load_or_empty(&config.storage.snapshot_path)?;

        let (index_store, blobs, extractor) = match capabilities.storage {
            StorageBackend::Memory => {
                let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new(
                    config.storage.blob_base_url.clone(),
                    config.storage.signing_secret.clone(),
                ));
                let extractor: Arc<dyn TextExtractor> = Arc::new(BlobTextExtractor::new(blobs.clone()));
                let index_store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::from_snapshot(&snapshot));
                (index_store, blobs, extractor)
            }
            StorageBackend::Aws => build_aws(config).await?,
        };

        let knowledge_base: Arc<dyn KnowledgeBase> = match &capabilities.search {
            SearchBackend::Keyword => Arc::new(KeywordKnowledgeBase::new(snapshot.passages)),
            SearchBackend::Vector { endpoint } => Arc::new(HttpKnowledgeBase::new(
                endpoint,
                &config.knowledge_base.id,
                &config.knowledge_base.data_source_id,
                config.query_timeout(),
            )?),
        };

        let generator: Arc<dyn TextGenerator> = match capabilities.generator {
            GeneratorBackend::OpenAI | GeneratorBackend::Ollama => Arc::new(LlmService::new(config)?),
            GeneratorBackend::Disabled => Arc::new(DisabledGenerator),
        };

        Ok(Self {
            index_store,
            blobs,
            knowledge_base,
            generator,
            extractor,
        })
    }
}

#[cfg(feature = "aws")]
async fn build_aws(config: &AppConfig) -> Result<StorageHandles> {
    use crate::ingest::textract::TextractExtractor;
    use crate::storage::aws::load_sdk_config;
    use crate::storage::aws::DynamoIndexStore;
    use crate::storage::aws::S3BlobStore;

    let sdk_config = load_sdk_config(config).await;
    let blobs: Arc<dyn BlobStore> = Arc::new(S3BlobStore::new(&sdk_config, config));
    Ok((
        Arc::new(DynamoIndexStore::new(&sdk_config, config)),
        blobs.clone(),
        Arc::new(TextractExtractor::new(&sdk_config, blobs)),
    ))
}

#[cfg(not(feature = "aws"))]
async fn build_aws(_config: &AppConfig) -> Result<StorageHandles> {
    Err(crate::errors::DocRagError::ConfigError(
        "storage.backend = \"aws\" requires the `aws` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_resolves_local_backends() {
        let caps = Capabilities::resolve(&AppConfig::default());
        assert_eq!(caps.generator, GeneratorBackend::Ollama);
        assert_eq!(caps.search, SearchBackend::Keyword);
        assert_eq!(caps.storage, StorageBackend::Memory);
        assert!(caps.qa_aware_scoring);
        assert!(caps.fallbacks.is_empty());
        assert_eq!(
            caps.knowledge_base.as_ref().map(|kb| kb.knowledge_base_id.as_str()),
            Some("local-knowledge-base")
        );
    }

    #[test]
    fn test_missing_endpoint_disables_generator() {
        let mut config = AppConfig::default();
        config.llm.llm_endpoint = String::new();
        let caps = Capabilities::resolve(&config);
        assert_eq!(caps.generator, GeneratorBackend::Disabled);
        assert_eq!(caps.fallbacks.len(), 1);
    }

    #[test]
    fn test_openai_without_key_disables_generator() {
        let mut config = AppConfig::default();
        config.llm.llm_endpoint = "https://api.openai.com/v1".to_string();
        config.llm.llm_key = String::new();
        assert_eq!(
            Capabilities::resolve(&config).generator,
            GeneratorBackend::Disabled
        );

        config.llm.llm_key = "sk-test".to_string();
        assert_eq!(Capabilities::resolve(&config).generator, GeneratorBackend::OpenAI);
    }

    #[test]
    fn test_vector_search_needs_endpoint() {
        let mut config = AppConfig::default();
        config.knowledge_base.search_backend = "vector".to_string();
        let caps = Capabilities::resolve(&config);
        assert_eq!(caps.search, SearchBackend::Keyword);
        assert!(caps.fallbacks[0].contains("retrieve_endpoint"));

        config.knowledge_base.retrieve_endpoint = "http://kb.local".to_string();
        assert_eq!(
            Capabilities::resolve(&config).search,
            SearchBackend::Vector {
                endpoint: "http://kb.local".to_string()
            }
        );
    }

    #[test]
    fn test_aws_storage_depends_on_feature() {
        let mut config = AppConfig::default();
        config.storage.backend = "aws".to_string();
        let caps = Capabilities::resolve(&config);
        if cfg!(feature = "aws") {
            assert_eq!(caps.storage, StorageBackend::Aws);
        } else {
            assert_eq!(caps.storage, StorageBackend::Memory);
            assert_eq!(caps.fallbacks.len(), 1);
        }
    }

    #[test]
    fn test_blank_knowledge_base_id_defers_to_store() {
        let mut config = AppConfig::default();
        config.knowledge_base.id = "  ".to_string();
        assert!(Capabilities::resolve(&config).knowledge_base.is_none());
    }

    #[tokio::test]
    async fn test_build_memory_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.snapshot_path = dir.path().join("none.json").display().to_string();
        config.llm.llm_endpoint = String::new();

        let caps = Capabilities::resolve(&config);
        let collaborators = Collaborators::build(&config, &caps).await.unwrap();
        assert_eq!(collaborators.knowledge_base.name(), "keyword");
        assert_eq!(collaborators.generator.name(), "disabled");
    }
}
