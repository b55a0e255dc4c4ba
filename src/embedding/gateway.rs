//! Batching and rate-limit handling in front of the embedding client
//!
//! The gateway is the only component that talks to the provider during an
//! index run. It slices staged chunks into provider-sized batches, retries
//! rate-limited batches with exponential backoff and jitter, and hands
//! each completed batch back to the caller before starting the next one,
//! so batch results are committed in order by a single writer.

use crate::chunker::Chunk;
use crate::config::EmbeddingConfig;
use crate::embedding::{EmbedError, EmbeddingClient};
use crate::error::{Result, VaultragError};
use crate::index::CancelToken;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// How an embed run over staged chunks ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// Every batch was embedded and delivered
    Completed,
    /// Cancellation was observed between batches; undelivered batches
    /// were abandoned
    Cancelled,
}

/// Events delivered to the caller while batches are processed
#[derive(Debug)]
pub enum GatewayEvent {
    /// Rate-limit backoff state changed
    Waiting(bool),
    /// One batch finished; pairs preserve chunk identity and input order
    BatchDone(Vec<(Chunk, Vec<f32>)>),
}

/// Rate-limited batching layer over an [`EmbeddingClient`]
pub struct EmbeddingGateway {
    client: Arc<dyn EmbeddingClient>,
    batch_size: usize,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl EmbeddingGateway {
    pub fn new(client: Arc<dyn EmbeddingClient>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    pub fn model_id(&self) -> &str {
        self.client.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.client.dimension()
    }

    /// Embed a single text, for query-time use. Retries like a batch.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let mut vectors = self
            .call_with_retry(&texts, &mut |_| Ok(()))
            .await
            .map_err(|source| VaultragError::Embedding {
                document: None,
                source,
            })?;

        vectors.pop().ok_or_else(|| VaultragError::Embedding {
            document: None,
            source: EmbedError::InvalidInput("provider returned no vector".to_string()),
        })
    }

    /// Embed staged chunks batch by batch
    ///
    /// `on_event` receives `Waiting` transitions while a batch is parked
    /// on backoff and `BatchDone` with each batch's `(chunk, vector)`
    /// pairs; an error from the callback (typically a storage failure)
    /// aborts the run. Cancellation is checked between batches only; an
    /// in-flight provider call finishes and its batch is still delivered.
    pub async fn embed_batches<F>(
        &self,
        chunks: Vec<Chunk>,
        cancel: &CancelToken,
        mut on_event: F,
    ) -> Result<GatewayOutcome>
    where
        F: FnMut(GatewayEvent) -> Result<()>,
    {
        for batch in chunks.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                tracing::info!("Embedding cancelled; abandoning remaining batches");
                return Ok(GatewayOutcome::Cancelled);
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let vectors = self
                .call_with_retry(&texts, &mut on_event)
                .await
                .map_err(|source| VaultragError::Embedding {
                    document: batch.first().map(|c| c.document_path.clone()),
                    source,
                })?;

            if vectors.len() != batch.len() {
                return Err(VaultragError::Embedding {
                    document: batch.first().map(|c| c.document_path.clone()),
                    source: EmbedError::InvalidInput(format!(
                        "vector count mismatch: expected {}, got {}",
                        batch.len(),
                        vectors.len()
                    )),
                });
            }

            let pairs: Vec<(Chunk, Vec<f32>)> =
                batch.iter().cloned().zip(vectors.into_iter()).collect();

            on_event(GatewayEvent::BatchDone(pairs))?;
        }

        Ok(GatewayOutcome::Completed)
    }

    /// One provider call with the retry/backoff policy applied
    async fn call_with_retry<F>(
        &self,
        texts: &[String],
        on_event: &mut F,
    ) -> std::result::Result<Vec<Vec<f32>>, EmbedError>
    where
        F: FnMut(GatewayEvent) -> Result<()>,
    {
        let mut attempt: u32 = 0;
        let mut signalled_wait = false;

        loop {
            match self.client.embed_batch(texts) {
                Ok(vectors) => {
                    if signalled_wait {
                        let _ = on_event(GatewayEvent::Waiting(false));
                    }
                    return Ok(vectors);
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.max_retries => {
                    let delay = self.backoff_delay(attempt, &e);

                    if matches!(e, EmbedError::RateLimited { .. }) {
                        signalled_wait = true;
                        let _ = on_event(GatewayEvent::Waiting(true));
                    }
                    tracing::warn!(
                        "Embedding batch attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if signalled_wait {
                        let _ = on_event(GatewayEvent::Waiting(false));
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Exponential backoff capped at the ceiling, with jitter in
    /// `[base/2, base]` so parallel vaults don't thunder in lockstep
    fn backoff_delay(&self, attempt: u32, error: &EmbedError) -> Duration {
        let exp = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);

        let base = match error {
            EmbedError::RateLimited {
                retry_after_ms: Some(ms),
            } => Duration::from_millis(*ms).max(exp),
            _ => exp,
        };

        let base_ms = base.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(base_ms / 2..=base_ms.max(1));
        Duration::from_millis(jittered)
    }
}
