//! Configuration management for vaultrag
//!
//! Loading, validation, and env-var overrides for the engine's settings.
//! Every tuning knob the pipeline consumes (chunk sizing, batch sizing,
//! backoff parameters, retrieval thresholds) lives here rather than as a
//! hard-coded constant.

use crate::error::{Result, VaultragError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub vault: VaultConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Corpus location and the glob filters applied to its listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Root directory of the note vault
    pub root: PathBuf,
    /// File extensions treated as documents
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Glob patterns a path must match to be indexed (empty = all)
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Glob patterns that exclude a path even when included
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "txt".to_string()]
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Chunking policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Characters of overlap carried between consecutive chunks
    #[serde(default)]
    pub chunk_overlap: usize,
    /// Chunks shorter than this are merged into their neighbor
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
}

fn default_min_chunk_chars() -> usize {
    24
}

/// Embedding provider and gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier; also the cache/index namespace
    pub model: String,
    /// Number of chunks per provider call
    pub batch_size: usize,
    /// Attempts per batch before the run fails
    pub max_retries: u32,
    /// First backoff delay after a rate-limit response
    pub initial_backoff_ms: u64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
    /// Entries held by the in-memory embedding cache
    pub cache_capacity: usize,
}

/// Query-time configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum results per query
    pub limit: usize,
    /// Results below this cosine similarity are dropped
    pub min_similarity: f32,
    /// Context budget in tokens; zero skips retrieval context entirely
    pub threshold_tokens: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VaultragError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| VaultragError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| VaultragError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: VAULTRAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("VAULTRAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "VAULT__ROOT" => {
                self.vault.root = PathBuf::from(value);
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__BATCH_SIZE" => {
                self.embedding.batch_size =
                    value.parse().map_err(|_| VaultragError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "RETRIEVAL__LIMIT" => {
                self.retrieval.limit =
                    value.parse().map_err(|_| VaultragError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "RETRIEVAL__MIN_SIMILARITY" => {
                self.retrieval.min_similarity =
                    value.parse().map_err(|_| VaultragError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as float", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| VaultragError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("vaultrag").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| VaultragError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".vaultrag"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            vault: VaultConfig {
                root: PathBuf::from("~/notes"),
                extensions: default_extensions(),
                include_patterns: Vec::new(),
                exclude_patterns: Vec::new(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.vaultrag"),
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 0,
                min_chunk_chars: default_min_chunk_chars(),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
                max_retries: 5,
                initial_backoff_ms: 500,
                max_backoff_ms: 30_000,
                cache_capacity: 16_384,
            },
            retrieval: RetrievalConfig {
                limit: 10,
                min_similarity: 0.4,
                threshold_tokens: 4096,
            },
        }
    }
}
