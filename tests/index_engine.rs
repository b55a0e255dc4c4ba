//! End-to-end tests of the indexing pipeline with an in-memory corpus
//! and a scripted embedding client.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use vaultrag::config::Config;
use vaultrag::embedding::{EmbedError, EmbeddingClient};
use vaultrag::error::{Result, VaultragError};
use vaultrag::index::{CancelToken, IndexEngine, IndexOptions, IndexProgress};
use vaultrag::source::{hash_content, DocumentMeta, DocumentSource};
use vaultrag::store::VectorStore;

/// In-memory corpus the tests mutate between runs
#[derive(Default)]
struct MemorySource {
    docs: Mutex<BTreeMap<String, String>>,
    unreadable: Mutex<HashSet<String>>,
}

impl MemorySource {
    fn set(&self, path: &str, content: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    fn remove(&self, path: &str) {
        self.docs.lock().unwrap().remove(path);
    }

    fn mark_unreadable(&self, path: &str) {
        self.unreadable.lock().unwrap().insert(path.to_string());
    }
}

impl DocumentSource for MemorySource {
    fn list_documents(&self) -> Result<Vec<DocumentMeta>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .map(|(path, content)| DocumentMeta {
                path: path.clone(),
                content_hash: hash_content(content.as_bytes()),
                mtime: 0,
            })
            .collect())
    }

    fn read_content(&self, path: &str) -> Result<String> {
        if self.unreadable.lock().unwrap().contains(path) {
            return Err(VaultragError::Source {
                path: path.to_string(),
                message: "permission denied".to_string(),
            });
        }
        self.docs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| VaultragError::Source {
                path: path.to_string(),
                message: "not found".to_string(),
            })
    }
}

/// Embedding client producing deterministic vectors, with scripted
/// failures and call accounting
struct ScriptedClient {
    model: String,
    calls: AtomicUsize,
    embedded_texts: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<EmbedError>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            embedded_texts: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            delay: None,
        }
    }

    fn with_failures(model: &str, failures: Vec<EmbedError>) -> Self {
        let client = Self::new(model);
        *client.failures.lock().unwrap() = failures.into();
        client
    }

    fn with_delay(model: &str, delay: Duration) -> Self {
        let mut client = Self::new(model);
        client.delay = Some(delay);
        client
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embedded_texts(&self) -> Vec<String> {
        self.embedded_texts.lock().unwrap().clone()
    }
}

/// Deterministic unit vector derived from the text bytes
fn embed_text(text: &str) -> Vec<f32> {
    let mut v = [1.0f32; 4];
    for (i, b) in text.bytes().enumerate() {
        v[i % 4] += b as f32;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

impl EmbeddingClient for ScriptedClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        4
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.embedded_texts
            .lock()
            .unwrap()
            .extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.chunking.chunk_size = 60;
    config.chunking.chunk_overlap = 0;
    config.chunking.min_chunk_chars = 0;
    config.embedding.batch_size = 2;
    config.embedding.max_retries = 4;
    config.embedding.initial_backoff_ms = 1;
    config.embedding.max_backoff_ms = 4;
    config
}

fn build_engine(
    source: Arc<MemorySource>,
    client: Arc<ScriptedClient>,
    temp: &TempDir,
) -> (Arc<IndexEngine>, Arc<VectorStore>) {
    let store = Arc::new(VectorStore::open(&temp.path().join("index.sqlite")).unwrap());
    let engine =
        IndexEngine::new(source, client, store.clone(), test_config()).unwrap();
    (Arc::new(engine), store)
}

async fn run(engine: &IndexEngine, reindex_all: bool) -> vaultrag::index::IndexStats {
    engine
        .update_index(
            IndexOptions { reindex_all },
            |_| {},
            &CancelToken::new(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_initial_index_embeds_everything() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "alpha alpha alpha.\n\nbeta beta beta.");
    source.set("b.md", "gamma gamma gamma.");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, store) = build_engine(source, client.clone(), &temp);

    let stats = run(&engine, false).await;

    assert_eq!(stats.documents_scanned, 2);
    assert_eq!(stats.documents_changed, 2);
    assert_eq!(stats.cache_hits, 0);
    assert!(stats.chunks_embedded > 0);
    assert!(!stats.cancelled);

    let state = store.indexed_state("model-a").unwrap();
    assert_eq!(state.len(), 2);
    assert!(!store.chunks_for_document("a.md").unwrap().is_empty());
}

#[tokio::test]
async fn test_idempotence_second_run_makes_no_embed_calls() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "some note content here.");
    source.set("b.md", "other note content there.");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, store) = build_engine(source, client.clone(), &temp);

    run(&engine, false).await;
    let calls_after_first = client.calls();
    let state_before = store.indexed_state("model-a").unwrap();

    let stats = run(&engine, false).await;

    assert_eq!(client.calls(), calls_after_first);
    assert_eq!(stats.documents_changed, 0);
    assert_eq!(stats.chunks_embedded, 0);
    assert!((stats.cache_hit_rate() - 1.0).abs() < f64::EPSILON);
    assert_eq!(store.indexed_state("model-a").unwrap(), state_before);
}

#[tokio::test]
async fn test_reindex_all_is_served_from_cache() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "stable content that never changes.");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, _store) = build_engine(source, client.clone(), &temp);

    run(&engine, false).await;
    let calls_after_first = client.calls();

    // Everything is staged again, but every vector comes from the cache
    let stats = run(&engine, true).await;

    assert_eq!(client.calls(), calls_after_first);
    assert_eq!(stats.chunks_embedded, 0);
    assert!(stats.cache_hits > 0);
    assert!((stats.cache_hit_rate() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_diff_correctness() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "unchanged document alpha.");
    source.set("b.md", "document beta to be removed.");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, store) = build_engine(source.clone(), client.clone(), &temp);

    run(&engine, false).await;
    let a_rows_before = store.chunks_for_document("a.md").unwrap();
    let texts_before = client.embedded_texts();

    // Corpus becomes {A, C}: B removed, C new, A untouched
    source.remove("b.md");
    source.set("c.md", "document gamma is brand new.");

    let stats = run(&engine, false).await;

    assert_eq!(stats.documents_removed, 1);
    assert_eq!(stats.documents_changed, 1);

    // Only C's chunks were embedded in the second run
    let new_texts: Vec<String> = client.embedded_texts()[texts_before.len()..].to_vec();
    assert!(!new_texts.is_empty());
    assert!(new_texts.iter().all(|t| t.contains("gamma")));

    // B's rows are gone, A's are untouched
    assert!(store.chunks_for_document("b.md").unwrap().is_empty());
    assert_eq!(store.chunks_for_document("a.md").unwrap(), a_rows_before);

    let state = store.indexed_state("model-a").unwrap();
    assert_eq!(state.len(), 2);
    assert!(state.contains_key("a.md"));
    assert!(state.contains_key("c.md"));
}

#[tokio::test]
async fn test_edit_replaces_rows_without_duplicates() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "first version of the note.");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, store) = build_engine(source.clone(), client.clone(), &temp);

    run(&engine, false).await;

    source.set("a.md", "second version of the note, now longer than before.");
    run(&engine, false).await;

    let rows = store.chunks_for_document("a.md").unwrap();
    assert!(rows.iter().all(|c| c.text.contains("second version")));

    let ids: HashSet<&str> = rows.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), rows.len());
}

#[tokio::test]
async fn test_model_switch_reembeds_everything() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "content that stays the same.");

    let client_a = Arc::new(ScriptedClient::new("model-a"));
    let store = Arc::new(VectorStore::open(&temp.path().join("index.sqlite")).unwrap());
    let engine_a = IndexEngine::new(
        source.clone(),
        client_a.clone(),
        store.clone(),
        test_config(),
    )
    .unwrap();

    let stats_a = engine_a
        .update_index(IndexOptions::default(), |_| {}, &CancelToken::new())
        .await
        .unwrap();
    assert!(stats_a.chunks_embedded > 0);

    // Same corpus, same store, different model: no cross-model cache or
    // state hits, everything is embedded again
    let client_b = Arc::new(ScriptedClient::new("model-b"));
    let engine_b = IndexEngine::new(source, client_b.clone(), store.clone(), test_config()).unwrap();

    let stats_b = engine_b
        .update_index(IndexOptions::default(), |_| {}, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(stats_b.documents_changed, 1);
    assert!(stats_b.chunks_embedded > 0);
    assert_eq!(stats_b.cache_hits, 0);
    assert!(client_b.calls() > 0);
    assert_eq!(store.indexed_state("model-b").unwrap().len(), 1);
}

#[tokio::test]
async fn test_self_healing_after_partial_write() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("d.md", "document dee in its current form.");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, store) = build_engine(source.clone(), client.clone(), &temp);

    // Fabricate the aftermath of an interrupted run: rows exist but the
    // recorded hash does not match the corpus
    let stale = DocumentMeta {
        path: "d.md".to_string(),
        content_hash: "stale-hash".to_string(),
        mtime: 0,
    };
    let stale_chunk = vaultrag::chunker::Chunk {
        id: "d.md#0-9".to_string(),
        document_path: "d.md".to_string(),
        start_offset: 0,
        end_offset: 9,
        text: "old bytes".to_string(),
        content_hash: hash_content(b"old bytes"),
    };
    store
        .commit_document(&stale, "model-a", &[(stale_chunk, vec![0.0, 0.0, 0.0, 1.0])])
        .unwrap();

    let stats = run(&engine, false).await;
    assert_eq!(stats.documents_changed, 1);

    // Exactly one row set, reflecting the current content
    let rows = store.chunks_for_document("d.md").unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|c| c.text.contains("current form")));
    let ids: HashSet<&str> = rows.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), rows.len());
}

#[tokio::test]
async fn test_rate_limit_resilience() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "rate limited but eventually indexed.");

    let client = Arc::new(ScriptedClient::with_failures(
        "model-a",
        vec![
            EmbedError::RateLimited {
                retry_after_ms: None,
            },
            EmbedError::RateLimited {
                retry_after_ms: None,
            },
        ],
    ));
    let (engine, store) = build_engine(source, client.clone(), &temp);

    let progress: Arc<Mutex<Vec<IndexProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();

    let stats = engine
        .update_index(
            IndexOptions::default(),
            move |p| sink.lock().unwrap().push(p),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(!stats.cancelled);
    assert!(stats.chunks_embedded > 0);
    assert_eq!(store.indexed_state("model-a").unwrap().len(), 1);

    let events = progress.lock().unwrap();
    assert!(events.iter().any(|p| p.waiting_for_rate_limit));
    // completed_chunks never goes backwards
    for pair in events.windows(2) {
        assert!(pair[0].completed_chunks <= pair[1].completed_chunks);
    }
}

#[tokio::test]
async fn test_auth_failure_aborts_without_state_commit() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "never gets committed.");

    let client = Arc::new(ScriptedClient::with_failures(
        "model-a",
        vec![EmbedError::Auth("invalid api key".to_string())],
    ));
    let (engine, store) = build_engine(source, client, &temp);

    let result = engine
        .update_index(IndexOptions::default(), |_| {}, &CancelToken::new())
        .await;

    assert!(matches!(
        result,
        Err(VaultragError::Embedding {
            source: EmbedError::Auth(_),
            ..
        })
    ));
    assert!(store.indexed_state("model-a").unwrap().is_empty());
    assert!(store.chunks_for_document("a.md").unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_document_skips_but_run_continues() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("good.md", "readable note.");
    source.set("bad.md", "unreadable note.");
    source.mark_unreadable("bad.md");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, store) = build_engine(source, client, &temp);

    let stats = run(&engine, false).await;

    assert_eq!(stats.documents_failed, 1);
    assert_eq!(stats.documents_changed, 1);

    let state = store.indexed_state("model-a").unwrap();
    assert!(state.contains_key("good.md"));
    assert!(!state.contains_key("bad.md"));
}

#[tokio::test]
async fn test_cancellation_keeps_committed_documents() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    // Enough content for several batches across two documents
    source.set("a.md", &"alpha paragraph one.\n\n".repeat(6));
    source.set("b.md", &"beta paragraph two.\n\n".repeat(6));

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, store) = build_engine(source.clone(), client.clone(), &temp);

    let cancel = CancelToken::new();
    let trigger = cancel.clone();

    let stats = engine
        .update_index(
            IndexOptions::default(),
            move |p: IndexProgress| {
                // Cancel once the first batch has landed
                if p.completed_chunks > 0 {
                    trigger.cancel();
                }
            },
            &cancel,
        )
        .await
        .unwrap();

    assert!(stats.cancelled);

    let state = store.indexed_state("model-a").unwrap();
    // Only fully committed documents appear in the state; the rest are
    // picked up by the next run
    for path in state.keys() {
        assert!(!store.chunks_for_document(path).unwrap().is_empty());
    }
    assert!(state.len() < 2);

    let stats = run(&engine, false).await;
    assert!(!stats.cancelled);
    assert_eq!(store.indexed_state("model-a").unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_update_is_rejected() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("a.md", "slow slow slow document.");

    let client = Arc::new(ScriptedClient::with_delay(
        "model-a",
        Duration::from_millis(300),
    ));
    let (engine, _store) = build_engine(source, client, &temp);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .update_index(IndexOptions::default(), |_| {}, &CancelToken::new())
                .await
        })
    };

    // Give the first run time to take the single-flight lock
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = engine
        .update_index(IndexOptions::default(), |_| {}, &CancelToken::new())
        .await;
    assert!(matches!(second, Err(VaultragError::IndexingInProgress)));

    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_query_after_index() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::default());
    source.set("recipes.md", "A braise needs patience and a heavy pot.");
    source.set("errands.md", "Buy stamps and drop off the parcel.");

    let client = Arc::new(ScriptedClient::new("model-a"));
    let (engine, _store) = build_engine(source, client, &temp);

    run(&engine, false).await;

    let mut config = engine.default_query_config();
    config.min_similarity = 0.0;
    let results = engine
        .query_text("A braise needs patience and a heavy pot.", Some(config))
        .await
        .unwrap();

    assert!(!results.is_empty());
    // Identical text embeds to the identical vector, so it ranks first
    assert_eq!(results[0].chunk.document_path, "recipes.md");
    assert!(results[0].similarity > 0.99);
}
