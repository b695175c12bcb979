//! Ingestion pipeline orchestration.
//!
//! Every source follows the same flow: load → split → embed → append to a
//! collection. PDFs land in the documents collection; web pages and text
//! files share the knowledge collection. Nothing is deduplicated, so
//! ingesting the same source twice stores its chunks twice.
//!
//! Embedding runs in batches of `embedding.batch_size`. Every batch is
//! embedded before the single upsert, so an embedding failure writes nothing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::chunk::chunk_documents;
use crate::config::{ChunkSpec, Config};
use crate::embedding::{embed_batched, Embedder};
use crate::error::{ServiceError, ServiceResult};
use crate::index::VectorIndex;
use crate::loader;
use crate::models::{IngestReport, RawDocument};
use crate::pool::CallGate;

const WEB_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Ingestor {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    gate: CallGate,
    http: reqwest::Client,
    pdf_chunking: ChunkSpec,
    text_chunking: ChunkSpec,
    documents_collection: String,
    knowledge_collection: String,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        gate: CallGate,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(WEB_FETCH_TIMEOUT)
            .user_agent(concat!("docent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            index,
            embedder,
            gate,
            http,
            pdf_chunking: config.chunking.pdf,
            text_chunking: config.chunking.text,
            documents_collection: config.index.documents_collection.clone(),
            knowledge_collection: config.index.knowledge_collection.clone(),
            batch_size: config.embedding.batch_size,
        })
    }

    /// Ingest an uploaded PDF, one document per page.
    pub async fn ingest_pdf(&self, file_name: &str, bytes: Vec<u8>) -> ServiceResult<IngestReport> {
        let docs = loader::load_pdf(file_name, bytes).await?;
        self.store(&self.documents_collection, &docs, &self.pdf_chunking)
            .await
    }

    /// Fetch a web page and ingest its visible text.
    pub async fn ingest_url(&self, url: &str) -> ServiceResult<IngestReport> {
        let doc = self
            .gate
            .run(async { Ok(loader::load_web(&self.http, url).await) })
            .await??;
        self.store(&self.knowledge_collection, &[doc], &self.text_chunking)
            .await
    }

    /// Ingest a UTF-8 text file on the server's filesystem.
    pub async fn ingest_text_file(&self, path: &Path) -> ServiceResult<IngestReport> {
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !exists {
            return Err(ServiceError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }
        let doc = loader::load_text_file(path).await?;
        self.store(&self.knowledge_collection, &[doc], &self.text_chunking)
            .await
    }

    /// Ingest uploaded bytes as a UTF-8 text document.
    pub async fn ingest_text_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> ServiceResult<IngestReport> {
        let doc = loader::load_text_bytes(file_name, bytes)?;
        self.store(&self.knowledge_collection, &[doc], &self.text_chunking)
            .await
    }

    async fn store(
        &self,
        collection: &str,
        docs: &[RawDocument],
        spec: &ChunkSpec,
    ) -> ServiceResult<IngestReport> {
        let chunks = chunk_documents(docs, spec);
        if chunks.is_empty() {
            let source = docs.first().map(|d| d.source.as_str()).unwrap_or("source");
            return Err(ServiceError::InvalidInput(format!(
                "{} contains no extractable text",
                source
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .gate
            .run(embed_batched(self.embedder.as_ref(), &texts, self.batch_size))
            .await?;

        let written = self
            .gate
            .run(
                self.index
                    .upsert(collection, &chunks, &vectors, self.embedder.model_name()),
            )
            .await?;

        let source = docs.first().map(|d| d.source.as_str()).unwrap_or_default();
        tracing::info!(
            source,
            collection,
            documents = docs.len(),
            chunks = written,
            "ingested"
        );

        Ok(IngestReport {
            documents: docs.len(),
            chunks: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeUnit;
    use crate::index::InMemoryIndex;
    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding server unavailable")
        }
    }

    fn ingestor(index: Arc<InMemoryIndex>, embedder: Arc<dyn Embedder>) -> Ingestor {
        let mut config = Config::minimal();
        config.chunking.text = ChunkSpec {
            chunk_size: 40,
            overlap: 8,
            unit: SizeUnit::Chars,
        };
        Ingestor::new(&config, index, embedder, CallGate::new(2)).unwrap()
    }

    #[tokio::test]
    async fn test_text_upload_lands_in_knowledge_collection() {
        let index = Arc::new(InMemoryIndex::new());
        let ing = ingestor(index.clone(), Arc::new(UnitEmbedder));
        let body = "The quick brown fox jumps over the lazy dog. ".repeat(5);
        let report = ing
            .ingest_text_upload("notes.txt", body.into_bytes())
            .await
            .unwrap();
        assert_eq!(report.documents, 1);
        assert!(report.chunks > 1);
        assert_eq!(
            index.count("rag-chroma").await.unwrap(),
            report.chunks as i64
        );
        assert_eq!(index.count("pdf").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reingest_doubles_count() {
        let index = Arc::new(InMemoryIndex::new());
        let ing = ingestor(index.clone(), Arc::new(UnitEmbedder));
        let first = ing
            .ingest_text_upload("a.txt", b"short note".to_vec())
            .await
            .unwrap();
        ing.ingest_text_upload("a.txt", b"short note".to_vec())
            .await
            .unwrap();
        assert_eq!(
            index.count("rag-chroma").await.unwrap(),
            2 * first.chunks as i64
        );
    }

    #[tokio::test]
    async fn test_missing_text_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let ing = ingestor(Arc::new(InMemoryIndex::new()), Arc::new(UnitEmbedder));
        let err = ing
            .ingest_text_file(&tmp.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_text_file_from_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        std::fs::write(&path, "Rust ownership keeps memory safe.").unwrap();
        let ing = ingestor(Arc::new(InMemoryIndex::new()), Arc::new(UnitEmbedder));
        let report = ing.ingest_text_file(&path).await.unwrap();
        assert_eq!(report, IngestReport { documents: 1, chunks: 1 });
    }

    #[tokio::test]
    async fn test_non_pdf_bytes_rejected() {
        let ing = ingestor(Arc::new(InMemoryIndex::new()), Arc::new(UnitEmbedder));
        let err = ing
            .ingest_pdf("notes.pdf", b"plain text".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_blank_upload_rejected() {
        let ing = ingestor(Arc::new(InMemoryIndex::new()), Arc::new(UnitEmbedder));
        let err = ing
            .ingest_text_upload("blank.txt", b"   \n ".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_upstream() {
        let index = Arc::new(InMemoryIndex::new());
        let ing = ingestor(index.clone(), Arc::new(FailingEmbedder));
        let err = ing
            .ingest_text_upload("a.txt", b"some text".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
        assert_eq!(index.count("rag-chroma").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_url_scheme_rejected() {
        let ing = ingestor(Arc::new(InMemoryIndex::new()), Arc::new(UnitEmbedder));
        let err = ing.ingest_url("ftp://example.com/x").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
