//! Index coordination
//!
//! `IndexEngine` owns the incremental pipeline: diff the corpus listing
//! against the persisted index state, re-chunk what changed, serve what
//! it can from the embedding cache, push the rest through the gateway,
//! and commit each document's rows atomically once its full chunk set
//! has vectors. It also serves query-time retrieval over the store.
//!
//! The engine is constructed from its collaborators (source, embedding
//! client, store, config), so tests build as many isolated instances as
//! they need.

use crate::cache::EmbeddingCache;
use crate::chunker::{Chunk, Chunker};
use crate::config::Config;
use crate::embedding::{EmbeddingClient, EmbeddingGateway, GatewayEvent, GatewayOutcome};
use crate::error::{IndexPhase, Result, VaultragError};
use crate::source::{DocumentMeta, DocumentSource, PathFilter};
use crate::store::{QueryConfig, QueryResult, VectorStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

mod context;
mod progress;

pub use context::build_context;
pub use progress::{CancelToken, IndexOptions, IndexProgress, IndexStats};

/// A changed document staged for embedding, with its chunks accumulating
/// vectors until the set is complete
struct StagedDocument {
    meta: DocumentMeta,
    total_chunks: usize,
    ready: Vec<(Chunk, Vec<f32>)>,
}

/// Orchestrates indexing and retrieval for one vault
pub struct IndexEngine {
    source: Arc<dyn DocumentSource>,
    gateway: EmbeddingGateway,
    store: Arc<VectorStore>,
    chunker: Chunker,
    cache: Mutex<EmbeddingCache>,
    filter: PathFilter,
    config: Config,
    /// Single-flight guard: at most one update_index per vault
    run_lock: tokio::sync::Mutex<()>,
}

impl IndexEngine {
    /// Build an engine from its injected collaborators
    pub fn new(
        source: Arc<dyn DocumentSource>,
        client: Arc<dyn EmbeddingClient>,
        store: Arc<VectorStore>,
        config: Config,
    ) -> Result<Self> {
        let filter = PathFilter::new(
            &config.vault.include_patterns,
            &config.vault.exclude_patterns,
        )
        .map_err(VaultragError::Config)?;

        Ok(Self {
            source,
            gateway: EmbeddingGateway::new(client, &config.embedding),
            store,
            chunker: Chunker::new(config.chunking.clone()),
            cache: Mutex::new(EmbeddingCache::new(config.embedding.cache_capacity)),
            filter,
            config,
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Bring the index up to date with the corpus
    ///
    /// Progress callbacks for one run report non-decreasing
    /// `completed_chunks`. On cancellation, documents committed so far
    /// stay indexed and the returned stats carry `cancelled: true`.
    /// A concurrent call fails fast with `IndexingInProgress`.
    pub async fn update_index<F>(
        &self,
        options: IndexOptions,
        mut on_progress: F,
        cancel: &CancelToken,
    ) -> Result<IndexStats>
    where
        F: FnMut(IndexProgress),
    {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| VaultragError::IndexingInProgress)?;

        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let model_id = self.gateway.model_id().to_string();

        tracing::info!(%run_id, model = %model_id, reindex_all = options.reindex_all, "Index update started");

        // Phase 1: list and filter the corpus
        let listed: Vec<DocumentMeta> = self
            .source
            .list_documents()?
            .into_iter()
            .filter(|d| self.filter.matches(&d.path))
            .collect();

        // Phase 2: diff against the persisted state for this model
        let state = self.store.indexed_state(&model_id)?;

        let changed: Vec<&DocumentMeta> = listed
            .iter()
            .filter(|d| options.reindex_all || state.get(&d.path) != Some(&d.content_hash))
            .collect();

        let listed_paths: std::collections::HashSet<&str> =
            listed.iter().map(|d| d.path.as_str()).collect();
        let removed: Vec<String> = state
            .keys()
            .filter(|path| !listed_paths.contains(path.as_str()))
            .cloned()
            .collect();

        let mut stats = IndexStats {
            run_id,
            documents_scanned: listed.len(),
            documents_changed: 0,
            documents_removed: 0,
            documents_failed: 0,
            chunks_embedded: 0,
            cache_hits: 0,
            cancelled: false,
            duration_ms: 0,
        };

        // Phase 3: drop rows owned by documents that left the corpus
        for path in &removed {
            self.store.delete_document(path)?;
            stats.documents_removed += 1;
            tracing::debug!(%run_id, path = %path, "Removed document");
        }

        // Phase 4: re-chunk changed documents; a read failure skips that
        // document and the rest of the run continues
        let mut staged: HashMap<String, StagedDocument> = HashMap::new();
        let mut misses: Vec<Chunk> = Vec::new();
        let mut total_chunks = 0usize;

        for meta in changed {
            if cancel.is_cancelled() {
                break;
            }

            let text = match self.source.read_content(&meta.path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(%run_id, path = %meta.path, "Skipping unreadable document: {}", e);
                    stats.documents_failed += 1;
                    continue;
                }
            };

            let chunks = self.chunker.chunk(&meta.path, &text);
            total_chunks += chunks.len();

            let mut doc = StagedDocument {
                meta: meta.clone(),
                total_chunks: chunks.len(),
                ready: Vec::with_capacity(chunks.len()),
            };

            // Phase 5: cache hits skip the provider entirely
            {
                let mut cache = self.cache.lock().expect("cache lock poisoned");
                for chunk in chunks {
                    match cache.get(&chunk.content_hash, &model_id) {
                        Some(vector) => {
                            stats.cache_hits += 1;
                            doc.ready.push((chunk, vector));
                        }
                        None => misses.push(chunk),
                    }
                }
            }

            staged.insert(meta.path.clone(), doc);
        }

        let mut completed_chunks = stats.cache_hits;
        on_progress(IndexProgress {
            completed_chunks,
            total_chunks,
            waiting_for_rate_limit: false,
        });

        // Phase 6: documents fully served from cache commit immediately
        let fully_cached: Vec<String> = staged
            .values()
            .filter(|d| d.ready.len() == d.total_chunks)
            .map(|d| d.meta.path.clone())
            .collect();
        for path in fully_cached {
            if cancel.is_cancelled() {
                break;
            }
            let doc = staged.remove(&path).expect("staged path");
            self.commit_staged(&doc, &model_id, &mut stats)?;
        }

        // Phase 7: embed the misses batch by batch; each completed batch
        // feeds the cache and any document whose chunk set just became
        // complete is committed on the spot
        let outcome = if misses.is_empty() || cancel.is_cancelled() {
            if cancel.is_cancelled() {
                GatewayOutcome::Cancelled
            } else {
                GatewayOutcome::Completed
            }
        } else {
            let staged_ref = &mut staged;
            let stats_ref = &mut stats;
            let completed_ref = &mut completed_chunks;

            self.gateway
                .embed_batches(misses, cancel, |event| match event {
                    GatewayEvent::Waiting(waiting) => {
                        on_progress(IndexProgress {
                            completed_chunks: *completed_ref,
                            total_chunks,
                            waiting_for_rate_limit: waiting,
                        });
                        Ok(())
                    }
                    GatewayEvent::BatchDone(pairs) => {
                        *completed_ref += pairs.len();
                        stats_ref.chunks_embedded += pairs.len();

                        {
                            let mut cache = self.cache.lock().expect("cache lock poisoned");
                            for (chunk, vector) in &pairs {
                                cache.put(&chunk.content_hash, &model_id, vector.clone());
                            }
                        }

                        let mut touched: Vec<String> = Vec::new();
                        for (chunk, vector) in pairs {
                            let path = chunk.document_path.clone();
                            if let Some(doc) = staged_ref.get_mut(&path) {
                                doc.ready.push((chunk, vector));
                                if doc.ready.len() == doc.total_chunks {
                                    touched.push(path);
                                }
                            }
                        }

                        for path in touched {
                            let doc = staged_ref.remove(&path).expect("staged path");
                            self.commit_staged(&doc, &model_id, stats_ref)?;
                        }

                        on_progress(IndexProgress {
                            completed_chunks: *completed_ref,
                            total_chunks,
                            waiting_for_rate_limit: false,
                        });
                        Ok(())
                    }
                })
                .await?
        };

        // Incomplete documents (cancelled runs) are discarded: their state
        // rows were never written, so the next run re-processes them
        if !staged.is_empty() {
            tracing::info!(
                %run_id,
                abandoned = staged.len(),
                "Abandoning partially embedded documents"
            );
        }

        stats.cancelled = outcome == GatewayOutcome::Cancelled || cancel.is_cancelled();
        stats.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            %run_id,
            changed = stats.documents_changed,
            removed = stats.documents_removed,
            embedded = stats.chunks_embedded,
            cache_hits = stats.cache_hits,
            cancelled = stats.cancelled,
            "Index update finished in {}ms",
            stats.duration_ms
        );

        Ok(stats)
    }

    /// Commit one staged document's complete chunk set
    fn commit_staged(
        &self,
        doc: &StagedDocument,
        model_id: &str,
        stats: &mut IndexStats,
    ) -> Result<()> {
        // Restore chunk order: cache hits and batch results arrive mixed
        let mut rows = doc.ready.clone();
        rows.sort_by_key(|(chunk, _)| chunk.start_offset);

        self.store
            .commit_document(&doc.meta, model_id, &rows)
            .map_err(|e| VaultragError::IndexingFailed {
                document: doc.meta.path.clone(),
                phase: IndexPhase::Writing,
                message: e.to_string(),
            })?;

        stats.documents_changed += 1;
        Ok(())
    }

    /// Retrieve the most similar chunks for a text query
    pub async fn query_text(
        &self,
        text: &str,
        overrides: Option<QueryConfig>,
    ) -> Result<Vec<QueryResult>> {
        let vector = self.gateway.embed_one(text).await?;
        self.query_vector(&vector, overrides)
    }

    /// Retrieve the most similar chunks for a pre-computed vector
    pub fn query_vector(
        &self,
        vector: &[f32],
        overrides: Option<QueryConfig>,
    ) -> Result<Vec<QueryResult>> {
        let config = overrides.unwrap_or_else(|| self.default_query_config());
        self.store.query(vector, self.gateway.model_id(), &config)
    }

    /// Format query results into a prompt context under the configured
    /// token budget
    pub fn assemble_context(&self, results: &[QueryResult]) -> String {
        build_context(results, self.config.retrieval.threshold_tokens)
    }

    /// Query configuration derived from the engine's settings
    pub fn default_query_config(&self) -> QueryConfig {
        QueryConfig {
            limit: self.config.retrieval.limit,
            min_similarity: self.config.retrieval.min_similarity,
            include_patterns: self.config.vault.include_patterns.clone(),
            exclude_patterns: self.config.vault.exclude_patterns.clone(),
        }
    }

    /// The store this engine writes to
    pub fn store(&self) -> &VectorStore {
        &self.store
    }
}
