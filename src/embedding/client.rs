/// Embedding capability trait and its error taxonomy
use thiserror::Error;

/// How an embedding call can fail
///
/// `RateLimited` and `Transport` are transient and eligible for retry;
/// `Auth` and `InvalidInput` abort the whole run immediately.
#[derive(Error, Debug, Clone)]
pub enum EmbedError {
    #[error("Provider rate limit hit")]
    RateLimited {
        /// Provider-suggested wait, when the response carried one
        retry_after_ms: Option<u64>,
    },

    #[error("Authentication or configuration rejected: {0}")]
    Auth(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    /// Whether retrying the same call can possibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedError::RateLimited { .. } | EmbedError::Transport(_)
        )
    }
}

/// Narrow capability over an embedding provider
///
/// One client is bound to one model; the model id doubles as the cache
/// and index namespace. Implementations must return exactly one vector
/// per input text, in input order.
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier this client embeds with
    fn model_id(&self) -> &str;

    /// Fixed dimension of produced vectors
    fn dimension(&self) -> usize;

    /// Embed a batch of texts
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}
