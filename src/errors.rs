use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocRagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Index store error: {0}")]
    StoreError(String),

    #[error("Blob store error: {0}")]
    BlobError(String),

    #[error("Knowledge base search error: {0}")]
    SearchError(String),

    #[error("Text generation error: {0}")]
    LlmError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

impl DocRagError {
    /// Whether the error is the caller's fault (bad request) rather than ours
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, DocRagError>;
