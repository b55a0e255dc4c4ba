//! Document source adapters
//!
//! The engine never owns the corpus; it consumes it through the narrow
//! `DocumentSource` capability: list documents with a content hash, read
//! one document's text. `FsVaultSource` is the filesystem implementation
//! used by the CLI; tests plug in an in-memory source.

use crate::error::{Result, VaultragError};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

mod filter;

pub use filter::PathFilter;

/// A document as listed by the source: identity, change marker, mtime
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMeta {
    /// Path relative to the vault root, `/`-separated
    pub path: String,
    /// Digest of the document content, the change-detection key
    pub content_hash: String,
    /// Last modification time (unix seconds)
    pub mtime: i64,
}

/// Narrow capability over the corpus
pub trait DocumentSource: Send + Sync {
    /// List all current documents with their content hashes
    fn list_documents(&self) -> Result<Vec<DocumentMeta>>;

    /// Read one document's full text
    fn read_content(&self, path: &str) -> Result<String>;
}

/// Filesystem-backed vault source
///
/// Walks the vault root, lists files with a configured extension, and
/// hashes file bytes with BLAKE3 for change detection.
pub struct FsVaultSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsVaultSource {
    pub fn new(root: PathBuf, extensions: Vec<String>) -> Self {
        Self { root, extensions }
    }

    fn has_document_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for part in rel.components() {
            segments.push(part.as_os_str().to_str()?.to_string());
        }
        Some(segments.join("/"))
    }
}

impl DocumentSource for FsVaultSource {
    fn list_documents(&self) -> Result<Vec<DocumentMeta>> {
        if !self.root.is_dir() {
            return Err(VaultragError::Source {
                path: self.root.display().to_string(),
                message: "vault root is not a directory".to_string(),
            });
        }

        let mut documents = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| VaultragError::Source {
                path: self.root.display().to_string(),
                message: format!("walk failed: {}", e),
            })?;

            if !entry.file_type().is_file() || !self.has_document_extension(entry.path()) {
                continue;
            }

            let Some(rel_path) = self.relative_path(entry.path()) else {
                tracing::warn!("Skipping non-UTF-8 path: {:?}", entry.path());
                continue;
            };

            let bytes = std::fs::read(entry.path()).map_err(|e| VaultragError::Source {
                path: rel_path.clone(),
                message: format!("read failed: {}", e),
            })?;

            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp())
                .unwrap_or(0);

            documents.push(DocumentMeta {
                path: rel_path,
                content_hash: hash_content(&bytes),
                mtime,
            });
        }

        // Stable listing order keeps diffs and progress reproducible
        documents.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(documents)
    }

    fn read_content(&self, path: &str) -> Result<String> {
        let full = self.root.join(path);
        std::fs::read_to_string(&full).map_err(|e| VaultragError::Source {
            path: path.to_string(),
            message: format!("read failed: {}", e),
        })
    }
}

/// BLAKE3 digest truncated to 32 hex characters
pub fn hash_content(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("{:.32}", hash.to_hex())
}
