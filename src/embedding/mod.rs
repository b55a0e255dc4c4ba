//! Embedding generation
//!
//! Architecture:
//! - `EmbeddingClient` trait: the narrow `embed(texts) -> vectors`
//!   capability the engine consumes; provider adapters live behind it
//! - `LocalEmbedder`: fastembed-backed client for fully local operation
//! - `EmbeddingGateway`: batches chunks into provider calls and absorbs
//!   rate limits with exponential backoff

mod client;
mod gateway;
mod local;

pub use client::{EmbedError, EmbeddingClient};
pub use gateway::{EmbeddingGateway, GatewayEvent, GatewayOutcome};
pub use local::LocalEmbedder;
