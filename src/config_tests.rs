//! Unit tests for configuration module
//!
//! These tests validate configuration parsing, defaults, and validation.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use crate::config::*;
    use crate::errors::DocRagError;

    const MINIMAL_TOML: &str = r#"
[logging]
level = "debug"
backtrace = false

[llm]
llm_endpoint = "http://localhost:11434"
llm_key = "ollama"

[storage]
metadata_table = "meta"

[knowledge_base]
id = "kb-123"
"#;

    // ====== Default Value Tests ======

    #[test]
    fn test_retrieval_defaults() {
        let retrieval = RetrievalConfig::default();
        assert!((retrieval.relevance_threshold - 5.0).abs() < f64::EPSILON);
        assert_eq!(retrieval.top_k, 5);
        assert_eq!(retrieval.qa_top_k, 5);
        assert!(retrieval.qa_aware_scoring);
        assert_eq!(retrieval.url_ttl_secs, 3600);
    }

    #[test]
    fn test_payload_default_threshold() {
        assert_eq!(default_overflow_threshold_bytes(), 200_000);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.knowledge_base.search_backend, "keyword");
    }

    // ====== Parsing Tests ======

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(MINIMAL_TOML).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.llm.llm_model, default_llm_model());
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.timeouts.signing_timeout_ms, 2_000);
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.knowledge_base.id, "kb-123");
    }

    #[test]
    fn test_from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.llm_endpoint(), "http://localhost:11434");
        assert_eq!(config.llm_key(), "ollama");
    }

    #[test]
    fn test_from_file_missing() {
        let result = AppConfig::from_file("/nonexistent/docrag/config.toml");
        assert!(matches!(result, Err(DocRagError::Io(_))));
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[logging\nlevel = ").unwrap();

        let result = AppConfig::from_file(file.path());
        assert!(matches!(result, Err(DocRagError::TomlParsing(_))));
    }

    // ====== Validation Tests ======

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(matches!(config.validate(), Err(DocRagError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let mut config = AppConfig::default();
        config.retrieval.relevance_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = AppConfig::default();
        config.retrieval.url_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = AppConfig::default();
        config.llm.llm_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    // ====== Accessor Tests ======

    #[test]
    fn test_search_index_table_falls_back_to_metadata_table() {
        let mut config = AppConfig::default();
        config.storage.search_index_table = String::new();
        config.storage.metadata_table = "meta".to_string();
        assert_eq!(config.search_index_table(), "meta");

        config.storage.search_index_table = "search".to_string();
        assert_eq!(config.search_index_table(), "search");
    }

    #[test]
    fn test_duration_accessors() {
        let config = AppConfig::default();
        assert_eq!(config.url_ttl().as_secs(), 3600);
        assert_eq!(config.signing_timeout().as_millis(), 2_000);
        assert_eq!(config.query_timeout().as_millis(), 30_000);
    }

    // ====== Environment Override Tests ======

    #[test]
    fn test_overrides_replace_non_empty_values() {
        let env: HashMap<&str, &str> = [
            ("DOCRAG_KNOWLEDGE_BASE_ID", "kb-from-env"),
            ("DOCRAG_PAYLOAD_BUCKET_NAME", "payloads-env"),
            ("DOCRAG_LLM_KEY", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.knowledge_base.id, "kb-from-env");
        assert_eq!(config.storage.payload_bucket, "payloads-env");
        // Blank values are ignored
        assert_eq!(config.llm.llm_key, "ollama");
    }
}
