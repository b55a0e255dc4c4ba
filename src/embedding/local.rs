/// fastembed-backed local embedding client
use super::{EmbedError, EmbeddingClient};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

/// Local embedding client with no network dependency at inference time
///
/// **Important**: models are downloaded on-demand to
/// `~/.cache/huggingface/` on first use. Supported models:
/// - all-MiniLM-L6-v2: ~90MB (384 dims) - default
/// - bge-small-en-v1.5: ~130MB (384 dims)
/// - bge-base-en-v1.5: ~440MB (768 dims)
pub struct LocalEmbedder {
    model: Arc<TextEmbedding>,
    model_id: String,
    dimension: usize,
}

impl LocalEmbedder {
    /// Initialize the model named by the configuration
    pub fn new(model_id: &str) -> Result<Self, EmbedError> {
        let embedding_model = match model_id {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            _ => {
                return Err(EmbedError::Auth(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_id
                )));
            }
        };

        let dimension = match embedding_model {
            EmbeddingModel::BGEBaseENV15 => 768,
            _ => 384,
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, downloaded if not cached)",
            model_id,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbedError::Transport(format!("model initialization failed: {}", e)))?;

        Ok(Self {
            model: Arc::new(model),
            model_id: model_id.to_string(),
            dimension,
        })
    }
}

impl EmbeddingClient for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.is_empty()) {
            return Err(EmbedError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbedError::Transport(format!("embedding failed: {}", e)))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }
}
