//! In-memory [`VectorIndex`] implementation.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`, one list per process.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

use super::{check_lengths, rank, Candidate, VectorIndex};

struct StoredRow {
    collection: String,
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    rows: RwLock<Vec<StoredRow>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        _model: &str,
    ) -> Result<usize> {
        check_lengths(chunks, vectors)?;
        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow!("index lock poisoned"))?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            rows.push(StoredRow {
                collection: collection.to_string(),
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(chunks.len())
    }

    async fn candidates(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let rows = self.rows.read().map_err(|_| anyhow!("index lock poisoned"))?;
        let scored = rows
            .iter()
            .filter(|r| r.collection == collection)
            .map(|r| Candidate {
                chunk: ScoredChunk {
                    chunk_id: r.chunk.id.clone(),
                    source: r.chunk.source.clone(),
                    page: r.chunk.page,
                    chunk_index: r.chunk.chunk_index,
                    text: r.chunk.text.clone(),
                    score: cosine_similarity(query_vec, &r.vector),
                },
                vector: r.vector.clone(),
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn count(&self, collection: &str) -> Result<i64> {
        let rows = self.rows.read().map_err(|_| anyhow!("index lock poisoned"))?;
        Ok(rows.iter().filter(|r| r.collection == collection).count() as i64)
    }
}
