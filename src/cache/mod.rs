//! In-memory embedding cache
//!
//! Memoizes `(content hash, model id) -> vector` so re-indexing unchanged
//! content never calls the provider twice. The cache is derived data: it
//! can be dropped at any point and a miss only costs a recompute. Bounded
//! with a two-generation LRU approximation so memory stays flat on large
//! vaults.

use ahash::AHashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    content_hash: String,
    model_id: String,
}

/// Bounded memoization layer in front of the embedding provider
///
/// Keys carry the model id: vectors from different models live in disjoint
/// namespaces and a model switch simply never hits.
pub struct EmbeddingCache {
    hot: AHashMap<CacheKey, Vec<f32>>,
    cold: AHashMap<CacheKey, Vec<f32>>,
    capacity: usize,
}

impl EmbeddingCache {
    /// Create a cache holding at most ~2x `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            hot: AHashMap::new(),
            cold: AHashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Look up a vector; a hit in the cold generation promotes the entry
    pub fn get(&mut self, content_hash: &str, model_id: &str) -> Option<Vec<f32>> {
        let key = CacheKey {
            content_hash: content_hash.to_string(),
            model_id: model_id.to_string(),
        };

        if let Some(vector) = self.hot.get(&key) {
            return Some(vector.clone());
        }

        if let Some(vector) = self.cold.remove(&key) {
            self.insert_hot(key, vector.clone());
            return Some(vector);
        }

        None
    }

    /// Store a freshly computed vector
    pub fn put(&mut self, content_hash: &str, model_id: &str, vector: Vec<f32>) {
        let key = CacheKey {
            content_hash: content_hash.to_string(),
            model_id: model_id.to_string(),
        };
        self.insert_hot(key, vector);
    }

    /// Drop everything; correctness is unaffected, only cost
    pub fn clear(&mut self) {
        self.hot.clear();
        self.cold.clear();
    }

    pub fn len(&self) -> usize {
        self.hot.len() + self.cold.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hot.is_empty() && self.cold.is_empty()
    }

    fn insert_hot(&mut self, key: CacheKey, vector: Vec<f32>) {
        if self.hot.len() >= self.capacity {
            // The hot generation becomes cold; the old cold generation
            // (least recently touched entries) is dropped wholesale
            self.cold = std::mem::take(&mut self.hot);
        }
        self.hot.insert(key, vector);
    }
}
