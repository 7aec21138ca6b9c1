//! Unit tests for error handling
//!
//! Covers error messages, 400 vs 500 classification and `?` conversions.

#[cfg(test)]
mod tests {
    use std::io;

    use crate::errors::DocRagError;

    // ====== Messages ======

    #[test]
    fn test_custom_error_is_bare_message() {
        let error = DocRagError::Custom("Text extraction job failed".to_string());
        assert_eq!(error.to_string(), "Text extraction job failed");
    }

    #[test]
    fn test_timeout_names_the_operation() {
        let error = DocRagError::Timeout("text extraction after 60 attempts".to_string());
        assert_eq!(
            error.to_string(),
            "Operation timed out: text extraction after 60 attempts"
        );
    }

    #[test]
    fn test_config_error() {
        let error = DocRagError::ConfigError("top_k must be greater than zero".to_string());
        assert!(matches!(error, DocRagError::ConfigError(_)));
        let display = format!("{}", error);
        assert!(display.contains("configuration"));
    }

    #[test]
    fn test_missing_configuration_message() {
        let error = DocRagError::MissingConfiguration("knowledge_base.id".to_string());
        let display = format!("{}", error);
        assert!(display.starts_with("Missing configuration"));
        assert!(display.contains("knowledge_base.id"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(DocRagError::InvalidInput("Missing query parameter".to_string()).is_client_error());
        assert!(!DocRagError::StoreError("scan failed".to_string()).is_client_error());
        assert!(!DocRagError::MissingConfiguration("kb".to_string()).is_client_error());
    }

    // ====== Error Conversion Tests ======

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let err: DocRagError = io_err.into();

        assert!(matches!(err, DocRagError::Io(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let parse_result: Result<serde_json::Value, _> = serde_json::from_str("{invalid json}");

        if let Err(json_err) = parse_result {
            let err: DocRagError = json_err.into();
            assert!(matches!(err, DocRagError::Serialization(_)));
        }
    }

    #[test]
    fn test_error_from_toml() {
        let parse_result: Result<toml::Value, _> = toml::from_str("this is = = not toml");

        if let Err(toml_err) = parse_result {
            let err: DocRagError = toml_err.into();
            assert!(matches!(err, DocRagError::TomlParsing(_)));
        }
    }

    // ====== Propagation ======

    fn read_snapshot(path: &std::path::Path) -> crate::Result<serde_json::Value> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    #[test]
    fn test_question_mark_keeps_io_kind() {
        let dir = tempfile::tempdir().unwrap();
        match read_snapshot(&dir.path().join("missing.json")) {
            Err(DocRagError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_question_mark_maps_bad_snapshot_to_serialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"indexRecords\": [").unwrap();

        let err = read_snapshot(&path).unwrap_err();
        assert!(matches!(err, DocRagError::Serialization(_)));
        assert!(!err.is_client_error());
    }
}
