use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::DocRagError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub backtrace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub llm_endpoint: String,
    pub llm_key: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Model used when a prompt carries an image
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

pub(crate) fn default_llm_model() -> String {
    "gemma3:27b".to_string()
}

pub(crate) fn default_vision_model() -> String {
    "llava:13b".to_string()
}

pub(crate) const fn default_temperature() -> f32 {
    0.1
}

pub(crate) const fn default_max_tokens() -> usize {
    4000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory` (local snapshot) or `aws`
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub metadata_table: String,
    /// Falls back to `metadata_table` when empty
    #[serde(default)]
    pub search_index_table: String,
    #[serde(default)]
    pub processed_bucket: String,
    #[serde(default)]
    pub payload_bucket: String,
    /// JSON snapshot used by the memory backend
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    /// Base URL the memory blob store signs links against
    #[serde(default = "default_blob_base_url")]
    pub blob_base_url: String,
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,
}

pub(crate) fn default_storage_backend() -> String {
    "memory".to_string()
}

pub(crate) fn default_region() -> String {
    "us-east-1".to_string()
}

pub(crate) fn default_snapshot_path() -> String {
    "data/index_snapshot.json".to_string()
}

pub(crate) fn default_blob_base_url() -> String {
    "http://localhost:9000".to_string()
}

pub(crate) fn default_signing_secret() -> String {
    "local-development-secret".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseSettings {
    /// Knowledge base identifier; answers are refused when this is empty
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data_source_id: String,
    #[serde(default)]
    pub role_arn: String,
    /// `keyword` (local passages) or `vector` (remote retrieve endpoint)
    #[serde(default = "default_search_backend")]
    pub search_backend: String,
    /// Retrieve endpoint for the vector backend
    #[serde(default)]
    pub retrieve_endpoint: String,
}

pub(crate) fn default_search_backend() -> String {
    "keyword".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_top_k")]
    pub qa_top_k: usize,
    #[serde(default = "default_qa_aware_scoring")]
    pub qa_aware_scoring: bool,
    /// Passages requested from the knowledge base per query
    #[serde(default = "default_passage_limit")]
    pub passage_limit: usize,
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

pub(crate) const fn default_relevance_threshold() -> f64 {
    5.0
}

pub(crate) const fn default_top_k() -> usize {
    5
}

pub(crate) const fn default_qa_aware_scoring() -> bool {
    true
}

pub(crate) const fn default_passage_limit() -> usize {
    5
}

pub(crate) const fn default_url_ttl_secs() -> u64 {
    3600
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            top_k: default_top_k(),
            qa_top_k: default_top_k(),
            qa_aware_scoring: default_qa_aware_scoring(),
            passage_limit: default_passage_limit(),
            url_ttl_secs: default_url_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    #[serde(default = "default_signing_timeout_ms")]
    pub signing_timeout_ms: u64,
}

pub(crate) const fn default_query_timeout_ms() -> u64 {
    30_000
}

pub(crate) const fn default_generation_timeout_ms() -> u64 {
    60_000
}

pub(crate) const fn default_signing_timeout_ms() -> u64 {
    2_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            generation_timeout_ms: default_generation_timeout_ms(),
            signing_timeout_ms: default_signing_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadConfig {
    /// Responses larger than this are written to the payload bucket
    #[serde(default = "default_overflow_threshold_bytes")]
    pub overflow_threshold_bytes: usize,
}

pub(crate) const fn default_overflow_threshold_bytes() -> usize {
    200_000
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            overflow_threshold_bytes: default_overflow_threshold_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub knowledge_base: KnowledgeBaseSettings,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(DocRagError::Io)?;

        let mut config: AppConfig = toml::from_str(&content).map_err(DocRagError::TomlParsing)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(DocRagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Override deployment-specific values from `DOCRAG_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 10] = [
            ("DOCRAG_LLM_ENDPOINT", &mut self.llm.llm_endpoint),
            ("DOCRAG_LLM_KEY", &mut self.llm.llm_key),
            ("DOCRAG_METADATA_TABLE_NAME", &mut self.storage.metadata_table),
            (
                "DOCRAG_SEARCH_INDEX_TABLE_NAME",
                &mut self.storage.search_index_table,
            ),
            ("DOCRAG_PROCESSED_BUCKET_NAME", &mut self.storage.processed_bucket),
            ("DOCRAG_PAYLOAD_BUCKET_NAME", &mut self.storage.payload_bucket),
            ("DOCRAG_SIGNING_SECRET", &mut self.storage.signing_secret),
            ("DOCRAG_KNOWLEDGE_BASE_ID", &mut self.knowledge_base.id),
            (
                "DOCRAG_KNOWLEDGE_BASE_ROLE_ARN",
                &mut self.knowledge_base.role_arn,
            ),
            (
                "DOCRAG_RETRIEVE_ENDPOINT",
                &mut self.knowledge_base.retrieve_endpoint,
            ),
        ];

        for (name, slot) in targets {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                *slot = value;
            }
        }
    }

    /// Reject settings that would make ranking or signing meaningless
    pub fn validate(&self) -> crate::Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(DocRagError::ConfigError(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.qa_top_k == 0 {
            return Err(DocRagError::ConfigError(
                "retrieval.qa_top_k must be greater than zero".to_string(),
            ));
        }
        if !self.retrieval.relevance_threshold.is_finite()
            || self.retrieval.relevance_threshold < 0.0
        {
            return Err(DocRagError::ConfigError(format!(
                "retrieval.relevance_threshold must be a non-negative number, got {}",
                self.retrieval.relevance_threshold
            )));
        }
        if self.retrieval.url_ttl_secs == 0 {
            return Err(DocRagError::ConfigError(
                "retrieval.url_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if !self.llm.llm_endpoint.is_empty() {
            url::Url::parse(&self.llm.llm_endpoint).map_err(|e| {
                DocRagError::ConfigError(format!(
                    "llm.llm_endpoint '{}' is not a valid URL: {e}",
                    self.llm.llm_endpoint
                ))
            })?;
        }
        Ok(())
    }

    /// Get LLM endpoint
    pub fn llm_endpoint(&self) -> &str {
        &self.llm.llm_endpoint
    }

    /// Get LLM key
    pub fn llm_key(&self) -> &str {
        &self.llm.llm_key
    }

    /// Get LLM model
    pub fn llm_model(&self) -> &str {
        &self.llm.llm_model
    }

    /// Table holding search-index records
    pub fn search_index_table(&self) -> &str {
        if self.storage.search_index_table.is_empty() {
            &self.storage.metadata_table
        } else {
            &self.storage.search_index_table
        }
    }

    /// Signed URL lifetime
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.retrieval.url_ttl_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.query_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.generation_timeout_ms)
    }

    pub fn signing_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.signing_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                backtrace: true,
            },
            llm: LlmConfig {
                llm_endpoint: "http://localhost:11434".to_string(),
                llm_key: "ollama".to_string(),
                llm_model: default_llm_model(),
                vision_model: default_vision_model(),
                temperature: default_temperature(),
                max_tokens: default_max_tokens(),
            },
            storage: StorageConfig {
                backend: default_storage_backend(),
                region: default_region(),
                metadata_table: "document-metadata".to_string(),
                search_index_table: "document-search-index".to_string(),
                processed_bucket: "processed-documents".to_string(),
                payload_bucket: "pipeline-payloads".to_string(),
                snapshot_path: default_snapshot_path(),
                blob_base_url: default_blob_base_url(),
                signing_secret: default_signing_secret(),
            },
            knowledge_base: KnowledgeBaseSettings {
                id: "local-knowledge-base".to_string(),
                data_source_id: "local-data-source".to_string(),
                role_arn: String::new(),
                search_backend: default_search_backend(),
                retrieve_endpoint: String::new(),
            },
            retrieval: RetrievalConfig::default(),
            timeouts: TimeoutConfig::default(),
            api: ApiConfig::default(),
            payload: PayloadConfig::default(),
        }
    }
}
