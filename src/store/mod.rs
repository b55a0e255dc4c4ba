//! SQLite-backed vector store
//!
//! Persists chunk and embedding rows plus the per-model index state, and
//! answers the similarity queries in [`query`]. A document's rows are
//! replaced via delete-then-insert inside one transaction together with
//! its state row, so readers never observe a half-written document and a
//! crash can never mark a partially stored document as indexed.

use crate::chunker::Chunk;
use crate::error::{Result, VaultragError};
use crate::source::DocumentMeta;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::HashMap;
use std::path::Path;

mod query;

pub use query::{QueryConfig, QueryResult, StoredChunk};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Vector store over a pooled SQLite database
pub struct VectorStore {
    pool: DbPool,
}

impl VectorStore {
    /// Open (or create) the store at the given path and run migrations
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VaultragError::Io {
                source: e,
                context: format!("Failed to create store directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| VaultragError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool.get().map_err(|e| {
                VaultragError::Config(format!("Failed to get connection: {}", e))
            })?;

            // WAL keeps queries readable while an index run writes
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;

        Ok(store)
    }

    /// Get a connection from the pool
    pub(crate) fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| VaultragError::Config(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// The persisted index state for one model: path -> content hash
    ///
    /// This is the `lastIndexedHash` map the coordinator diffs against.
    /// Scoped to the model id, so switching models yields an empty state
    /// and every document reads as changed.
    pub fn indexed_state(&self, model_id: &str) -> Result<HashMap<String, String>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare("SELECT path, content_hash FROM documents WHERE model_id = ?1")?;
        let rows = stmt.query_map(params![model_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut state = HashMap::new();
        for row in rows {
            let (path, hash) = row?;
            state.insert(path, hash);
        }

        Ok(state)
    }

    /// Commit one document's full chunk set atomically
    ///
    /// Deletes whatever rows the path had (any model), inserts the new
    /// chunk and embedding rows, and upserts the state row, all in one
    /// transaction. Called only once every chunk has its vector.
    pub fn commit_document(
        &self,
        document: &DocumentMeta,
        model_id: &str,
        chunks: &[(Chunk, Vec<f32>)],
    ) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let now = chrono::Utc::now().timestamp();

        tx.execute(
            "INSERT INTO documents (path, content_hash, model_id, mtime, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 model_id = excluded.model_id,
                 mtime = excluded.mtime,
                 indexed_at = excluded.indexed_at",
            params![&document.path, &document.content_hash, model_id, document.mtime, now],
        )?;

        // Stale rows cascade away with the chunks
        tx.execute(
            "DELETE FROM chunks WHERE document_path = ?1",
            params![&document.path],
        )?;

        for (seq, (chunk, vector)) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (id, document_path, seq, start_offset, end_offset, text, content_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &chunk.id,
                    &chunk.document_path,
                    seq as i64,
                    chunk.start_offset as i64,
                    chunk.end_offset as i64,
                    &chunk.text,
                    &chunk.content_hash,
                ],
            )?;

            tx.execute(
                "INSERT INTO embeddings (chunk_id, model_id, dim, vector)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    &chunk.id,
                    model_id,
                    vector.len() as i64,
                    encode_vector(vector),
                ],
            )?;
        }

        tx.commit()?;

        tracing::debug!(
            "Committed {} chunks for {}",
            chunks.len(),
            document.path
        );

        Ok(())
    }

    /// Remove a document and all rows it owns
    pub fn delete_document(&self, path: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM documents WHERE path = ?1", params![path])?;
        Ok(())
    }

    /// Chunk rows currently stored for a document, in sequence order
    pub fn chunks_for_document(&self, path: &str) -> Result<Vec<StoredChunk>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, document_path, start_offset, end_offset, text, content_hash
             FROM chunks WHERE document_path = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![path], |row| {
            Ok(StoredChunk {
                id: row.get(0)?,
                document_path: row.get(1)?,
                start_offset: row.get::<_, i64>(2)? as usize,
                end_offset: row.get::<_, i64>(3)? as usize,
                text: row.get(4)?,
                content_hash: row.get(5)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(VaultragError::from)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;

        let document_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let chunk_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let embedding_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;

        Ok(StoreStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            embedding_count: embedding_count as usize,
        })
    }
}

/// Store statistics
#[derive(Debug)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub embedding_count: usize,
}

/// f32 slice to little-endian bytes for the BLOB column
pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// BLOB column bytes back to an f32 vector
pub(crate) fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Index state: one row per document per active model
    CREATE TABLE documents (
        path TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        model_id TEXT NOT NULL,
        mtime INTEGER NOT NULL,
        indexed_at INTEGER NOT NULL
    );

    CREATE INDEX idx_documents_model ON documents(model_id);

    -- Chunk rows, replaced wholesale when their document changes
    CREATE TABLE chunks (
        id TEXT PRIMARY KEY,
        document_path TEXT NOT NULL,
        seq INTEGER NOT NULL,
        start_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL,
        text TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        FOREIGN KEY (document_path) REFERENCES documents(path) ON DELETE CASCADE
    );

    CREATE INDEX idx_chunks_document ON chunks(document_path);
    CREATE INDEX idx_chunks_content_hash ON chunks(content_hash);

    -- Embedding vectors, one per chunk, namespaced by model
    CREATE TABLE embeddings (
        chunk_id TEXT PRIMARY KEY,
        model_id TEXT NOT NULL,
        dim INTEGER NOT NULL,
        vector BLOB NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model_id);
    "#,
];
