//! Similarity query layer
//!
//! Exact cosine scan over the active model's rows. Candidates are
//! restricted by dimension and by include/exclude glob filters before
//! scoring; ranking is fully deterministic so query results are
//! reproducible across runs and machines.

use crate::error::{Result, VaultragError};
use crate::source::PathFilter;
use crate::store::{decode_vector, VectorStore};
use rusqlite::params;
use serde::Serialize;

/// Query-time knobs; all come from configuration, callers may override
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Maximum results returned
    pub limit: usize,
    /// Results below this similarity are dropped
    pub min_similarity: f32,
    /// Glob patterns a document path must match (empty = all)
    pub include_patterns: Vec<String>,
    /// Glob patterns that exclude a document path
    pub exclude_patterns: Vec<String>,
}

/// A chunk row as stored, without its vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub id: String,
    pub document_path: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub content_hash: String,
}

/// One retrieval hit
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub chunk: StoredChunk,
    /// Cosine similarity clamped to [0, 1]
    pub similarity: f32,
}

impl VectorStore {
    /// k-nearest-neighbor query over the active model's embeddings
    ///
    /// Rows whose stored dimension differs from the query vector (stale
    /// rows from a previously configured model) are excluded from the
    /// candidate set, not scored as zero. Ties on similarity break by
    /// shorter chunk text, then lexical path order.
    pub fn query(
        &self,
        query_vector: &[f32],
        model_id: &str,
        config: &QueryConfig,
    ) -> Result<Vec<QueryResult>> {
        if query_vector.is_empty() {
            return Err(VaultragError::Config(
                "Query vector cannot be empty".to_string(),
            ));
        }

        let filter = PathFilter::new(&config.include_patterns, &config.exclude_patterns)
            .map_err(VaultragError::Config)?;

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.document_path, c.start_offset, c.end_offset, c.text,
                    c.content_hash, e.dim, e.vector
             FROM chunks c
             JOIN embeddings e ON e.chunk_id = c.id
             WHERE e.model_id = ?1",
        )?;

        let rows = stmt.query_map(params![model_id], |row| {
            Ok((
                StoredChunk {
                    id: row.get(0)?,
                    document_path: row.get(1)?,
                    start_offset: row.get::<_, i64>(2)? as usize,
                    end_offset: row.get::<_, i64>(3)? as usize,
                    text: row.get(4)?,
                    content_hash: row.get(5)?,
                },
                row.get::<_, i64>(6)? as usize,
                row.get::<_, Vec<u8>>(7)?,
            ))
        })?;

        let mut results = Vec::new();

        for row in rows {
            let (chunk, dim, blob) = row?;

            if dim != query_vector.len() {
                continue;
            }
            if !filter.matches(&chunk.document_path) {
                continue;
            }

            let vector = decode_vector(&blob);
            let similarity = cosine_similarity(query_vector, &vector).clamp(0.0, 1.0);

            if similarity >= config.min_similarity {
                results.push(QueryResult { chunk, similarity });
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.text.len().cmp(&b.chunk.text.len()))
                .then_with(|| a.chunk.document_path.cmp(&b.chunk.document_path))
                .then_with(|| a.chunk.start_offset.cmp(&b.chunk.start_offset))
        });
        results.truncate(config.limit);

        Ok(results)
    }
}

/// Cosine similarity of two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
