//! Query-time retrieval over a [`VectorIndex`] collection.
//!
//! Two strategies:
//!
//! - **Similarity**: top-k chunks by cosine similarity.
//! - **MMR** (maximal marginal relevance): fetch `fetch_k` candidates, then
//!   greedily pick `k` of them, trading similarity to the query against
//!   similarity to chunks already picked:
//!
//! ```text
//! score(d) = λ · sim(q, d) − (1 − λ) · max_{s ∈ selected} sim(d, s)
//! ```
//!
//! With λ = 1 MMR reduces to similarity ordering.
//!
//! [`is_relevant`] is the gate `/ask_pdf` uses to choose between the
//! document prompt and the general-knowledge prompt.

use anyhow::Result;
use std::sync::Arc;

use crate::config::{RetrievalConfig, StrategyKind};
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::index::{Candidate, VectorIndex};
use crate::models::ScoredChunk;
use crate::pool::CallGate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Similarity { k: usize },
    Mmr { k: usize, fetch_k: usize, lambda: f32 },
}

impl Strategy {
    /// The strategy used for document answers.
    pub fn from_config(config: &RetrievalConfig) -> Self {
        match config.strategy {
            StrategyKind::Similarity => Strategy::Similarity { k: config.k },
            StrategyKind::Mmr => Strategy::Mmr {
                k: config.k,
                fetch_k: config.fetch_k.max(config.k),
                lambda: config.lambda,
            },
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    gate: CallGate,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>, gate: CallGate) -> Self {
        Self {
            index,
            embedder,
            gate,
        }
    }

    /// Chunks of `collection` for `query`, most relevant first.
    ///
    /// An empty collection returns no chunks without embedding the query.
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &str,
        strategy: Strategy,
    ) -> Result<Vec<ScoredChunk>> {
        let stored = self.gate.run(self.index.count(collection)).await?;
        if stored == 0 {
            tracing::debug!(collection, "collection is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let query_vec = self
            .gate
            .run(embed_query(self.embedder.as_ref(), query))
            .await?;

        match strategy {
            Strategy::Similarity { k } => {
                self.gate
                    .run(self.index.search(collection, &query_vec, k))
                    .await
            }
            Strategy::Mmr { k, fetch_k, lambda } => {
                let candidates = self
                    .gate
                    .run(self.index.candidates(collection, &query_vec, fetch_k))
                    .await?;
                Ok(mmr_select(candidates, k, lambda))
            }
        }
    }
}

/// Greedy maximal-marginal-relevance selection.
///
/// `candidates` carry their similarity to the query in `chunk.score`. The
/// returned chunks keep that score. Ties go to the earlier candidate.
pub fn mmr_select(candidates: Vec<Candidate>, k: usize, lambda: f32) -> Vec<ScoredChunk> {
    let mut remaining = candidates;
    let mut selected: Vec<Candidate> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (i, cand) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(&cand.vector, &s.vector))
                .fold(None, |acc: Option<f32>, sim| {
                    Some(acc.map_or(sim, |a| a.max(sim)))
                })
                .unwrap_or(0.0);
            let score = lambda * cand.chunk.score - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected.into_iter().map(|c| c.chunk).collect()
}

/// True iff any chunk scores strictly above `threshold`.
pub fn is_relevant(chunks: &[ScoredChunk], threshold: f32) -> bool {
    chunks.iter().any(|c| c.score > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(text: &str, vector: Vec<f32>, query: &[f32]) -> Candidate {
        Candidate {
            chunk: ScoredChunk {
                chunk_id: text.to_string(),
                source: "s".to_string(),
                page: None,
                chunk_index: 0,
                text: text.to_string(),
                score: cosine_similarity(query, &vector),
            },
            vector,
        }
    }

    fn scored(score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk_id: String::new(),
            source: String::new(),
            page: None,
            chunk_index: 0,
            text: String::new(),
            score,
        }
    }

    fn texts(chunks: &[ScoredChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_mmr_lambda_one_is_similarity_order() {
        let q = [1.0, 0.0];
        let cands = vec![
            candidate("a", vec![1.0, 0.0], &q),
            candidate("a2", vec![0.99, 0.01], &q),
            candidate("b", vec![0.6, 0.8], &q),
        ];
        let picked = mmr_select(cands, 3, 1.0);
        assert_eq!(texts(&picked), vec!["a", "a2", "b"]);
    }

    #[test]
    fn test_mmr_skips_near_duplicate() {
        let q = [1.0, 0.0];
        let cands = vec![
            candidate("a", vec![1.0, 0.0], &q),
            candidate("a2", vec![0.99, 0.01], &q),
            candidate("b", vec![0.6, 0.8], &q),
        ];
        let picked = mmr_select(cands, 2, 0.3);
        assert_eq!(texts(&picked), vec!["a", "b"]);
    }

    #[test]
    fn test_mmr_k_larger_than_candidates() {
        let q = [1.0];
        let picked = mmr_select(vec![candidate("only", vec![1.0], &q)], 5, 0.7);
        assert_eq!(picked.len(), 1);
        assert!(mmr_select(Vec::new(), 5, 0.7).is_empty());
    }

    #[test]
    fn test_is_relevant_threshold_is_strict() {
        assert!(!is_relevant(&[], 0.1));
        assert!(!is_relevant(&[scored(0.05), scored(0.1)], 0.1));
        assert!(is_relevant(&[scored(0.05), scored(0.5)], 0.1));
    }

    #[test]
    fn test_strategy_from_config() {
        let config = RetrievalConfig::default();
        assert_eq!(
            Strategy::from_config(&config),
            Strategy::Mmr {
                k: 5,
                fetch_k: 20,
                lambda: 0.7
            }
        );
        let config = RetrievalConfig {
            strategy: StrategyKind::Similarity,
            ..RetrievalConfig::default()
        };
        assert_eq!(Strategy::from_config(&config), Strategy::Similarity { k: 5 });
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_empty_collection_skips_embedding() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(
            Arc::new(InMemoryIndex::new()),
            embedder.clone(),
            CallGate::new(2),
        );
        let hits = retriever
            .retrieve("pdf", "anything", Strategy::Similarity { k: 3 })
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retrieve_with_mmr() {
        let index = Arc::new(InMemoryIndex::new());
        let chunk = |text: &str| Chunk {
            id: text.to_string(),
            source: "doc".to_string(),
            page: None,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
        };
        index
            .upsert(
                "pdf",
                &[chunk("a"), chunk("a2"), chunk("b")],
                &[vec![1.0, 0.0], vec![0.99, 0.01], vec![0.6, 0.8]],
                "m",
            )
            .await
            .unwrap();

        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(index, embedder.clone(), CallGate::new(2));
        let hits = retriever
            .retrieve(
                "pdf",
                "q",
                Strategy::Mmr {
                    k: 2,
                    fetch_k: 3,
                    lambda: 0.3,
                },
            )
            .await
            .unwrap();
        assert_eq!(texts(&hits), vec!["a", "b"]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }
}
