//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian `f32` BLOBs in the `embeddings`
//! table. Search loads the collection's vectors and computes cosine
//! similarity in Rust.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, ScoredChunk};

use super::{check_lengths, rank, Candidate, VectorIndex};

/// Totals for one collection, as reported by `docent stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub collection: String,
    pub chunks: i64,
    pub sources: i64,
    pub last_ingested: Option<i64>,
}

#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open the index file at `path`, creating it and its schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open index at {}", path.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Per-collection totals, sorted by collection name.
    pub async fn collection_stats(&self) -> Result<Vec<CollectionStats>> {
        let rows = sqlx::query(
            r#"
            SELECT
                collection,
                COUNT(*) AS chunk_count,
                COUNT(DISTINCT source) AS source_count,
                MAX(created_at) AS last_ingested
            FROM embeddings
            GROUP BY collection
            ORDER BY collection
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| CollectionStats {
                collection: row.get("collection"),
                chunks: row.get("chunk_count"),
                sources: row.get("source_count"),
                last_ingested: row.get("last_ingested"),
            })
            .collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<usize> {
        check_lengths(chunks, vectors)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO embeddings
                    (id, collection, source, page, chunk_index, text, hash, model, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(collection)
            .bind(&chunk.source)
            .bind(chunk.page.map(|p| p as i64))
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(chunks.len())
    }

    async fn candidates(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, page, chunk_index, text, embedding
            FROM embeddings
            WHERE collection = ?
            ORDER BY rowid
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let page: Option<i64> = row.get("page");
                Candidate {
                    chunk: ScoredChunk {
                        chunk_id: row.get("id"),
                        source: row.get("source"),
                        page: page.map(|p| p as u32),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        score: cosine_similarity(query_vec, &vector),
                    },
                    vector,
                }
            })
            .collect();

        Ok(rank(scored, limit))
    }

    async fn count(&self, collection: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(source: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            page: Some(1),
            chunk_index: index,
            text: text.to_string(),
            hash: "h".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_creates_file_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.sqlite");
        let index = SqliteIndex::open(&path).await.unwrap();
        index.close().await;
        assert!(path.exists());

        let index = SqliteIndex::open(&path).await.unwrap();
        assert_eq!(index.count("pdf").await.unwrap(), 0);
        index.close().await;
    }

    #[tokio::test]
    async fn test_upsert_and_search_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();

        index
            .upsert(
                "pdf",
                &[chunk("a.pdf", 0, "north"), chunk("a.pdf", 1, "east")],
                &[vec![0.0, 1.0], vec![1.0, 0.0]],
                "test-model",
            )
            .await
            .unwrap();

        let hits = index.search("pdf", &[0.1, 0.9], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[0].page, Some(1));
        assert_eq!(hits[1].chunk_index, 1);

        let with_vectors = index.candidates("pdf", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(with_vectors[0].vector, vec![1.0, 0.0]);
        index.close().await;
    }

    #[tokio::test]
    async fn test_reingest_appends_rows() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();

        for _ in 0..2 {
            index
                .upsert("rag-chroma", &[chunk("n.txt", 0, "same text")], &[vec![1.0]], "m")
                .await
                .unwrap();
        }
        assert_eq!(index.count("rag-chroma").await.unwrap(), 2);
        let stats = index.collection_stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].collection, "rag-chroma");
        assert_eq!(stats[0].chunks, 2);
        assert_eq!(stats[0].sources, 1);
        assert!(stats[0].last_ingested.is_some());
        index.close().await;
    }
}
