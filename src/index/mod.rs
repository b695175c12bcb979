//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is everything the ingestion pipeline and the
//! retriever need from storage: append embedded chunks to a named
//! collection, and score a collection against a query vector.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`SqliteIndex`] | Persistent index in a single SQLite file (`sqlx`) |
//! | [`InMemoryIndex`] | Process-local index for tests |
//!
//! Both score by brute-force cosine similarity. Ordering among equal
//! scores follows insertion order.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk};

pub use memory::InMemoryIndex;
pub use sqlite::{CollectionStats, SqliteIndex};

/// A scored chunk together with its stored vector, for re-ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: ScoredChunk,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append chunks and their vectors to `collection`.
    ///
    /// Never replaces existing rows. Returns the number of rows written.
    async fn upsert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<usize>;

    /// Top `limit` chunks of `collection` by similarity, with their vectors.
    async fn candidates(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<Candidate>>;

    /// Number of chunks stored in `collection`.
    async fn count(&self, collection: &str) -> Result<i64>;

    /// Top `k` chunks of `collection` by similarity, most similar first.
    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        Ok(self
            .candidates(collection, query_vec, k)
            .await?
            .into_iter()
            .map(|c| c.chunk)
            .collect())
    }
}

pub(crate) fn check_lengths(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}

/// Sort by score descending (stable) and keep the first `limit`.
pub(crate) fn rank(mut candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.chunk
            .score
            .partial_cmp(&a.chunk.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(limit);
    candidates
}
