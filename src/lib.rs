//! Vaultrag - Incremental Vector Indexing for Note Vaults
//!
//! The retrieval backbone of a note-taking assistant: diffs a document
//! corpus against its last indexed state, chunks what changed, embeds the
//! chunks under provider rate limits with a content-hash cache in front,
//! persists vectors in SQLite, and answers filtered similarity queries.

pub mod cache;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod source;
pub mod store;

pub use error::{Result, VaultragError};
