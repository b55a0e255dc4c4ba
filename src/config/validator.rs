use crate::config::Config;
use crate::error::{Result, ValidationError, VaultragError};
use crate::source::PathFilter;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_vault(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VaultragError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_vault(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.vault.root.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "vault.root",
                "Vault root path cannot be empty",
            ));
        }

        if config.vault.extensions.is_empty() {
            errors.push(ValidationError::new(
                "vault.extensions",
                "At least one document extension is required",
            ));
        }

        // Compiling the filters catches malformed glob patterns up front
        if let Err(e) = PathFilter::new(
            &config.vault.include_patterns,
            &config.vault.exclude_patterns,
        ) {
            errors.push(ValidationError::new(
                "vault.include_patterns",
                format!("Invalid glob pattern: {}", e),
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if config.chunking.chunk_overlap >= config.chunking.chunk_size.max(1) {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                "Overlap must be smaller than chunk size",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model identifier cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.max_retries == 0 {
            errors.push(ValidationError::new(
                "embedding.max_retries",
                "At least one attempt per batch is required",
            ));
        }

        if config.embedding.initial_backoff_ms > config.embedding.max_backoff_ms {
            errors.push(ValidationError::new(
                "embedding.initial_backoff_ms",
                "Initial backoff cannot exceed the backoff ceiling",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.limit",
                "Result limit must be greater than 0",
            ));
        }

        let min_sim = config.retrieval.min_similarity;
        if !(0.0..=1.0).contains(&min_sim) {
            errors.push(ValidationError::new(
                "retrieval.min_similarity",
                format!("Similarity threshold must be in [0, 1], got {}", min_sim),
            ));
        }
    }
}
