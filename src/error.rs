use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbedError;

/// Pipeline phase attached to indexing failures so callers can render
/// a useful message ("failed while embedding notes/foo.md")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Listing,
    Chunking,
    Embedding,
    Writing,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexPhase::Listing => "listing",
            IndexPhase::Chunking => "chunking",
            IndexPhase::Embedding => "embedding",
            IndexPhase::Writing => "writing",
        };
        f.write_str(s)
    }
}

/// Main error type for the vaultrag engine
#[derive(Error, Debug)]
pub enum VaultragError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Document source failure (corpus listing or content read)
    #[error("Source error for {path}: {message}")]
    Source { path: String, message: String },

    /// Embedding provider failure, with the document being processed when
    /// it happened (None for query-time embedding)
    #[error("Embedding failed for {}: {source}", .document.as_deref().unwrap_or("query"))]
    Embedding {
        document: Option<String>,
        #[source]
        source: EmbedError,
    },

    /// Terminal indexing failure: retries exhausted or a fatal provider
    /// or storage error
    #[error("Indexing failed for {document} during {phase}: {message}")]
    IndexingFailed {
        document: String,
        phase: IndexPhase,
        message: String,
    },

    /// A second update_index was attempted while one is in flight
    #[error("An index update is already running for this vault")]
    IndexingInProgress,

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for vaultrag operations
pub type Result<T> = std::result::Result<T, VaultragError>;
