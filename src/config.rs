//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! [`load_config`] parses and validates; [`Config::minimal`] returns the
//! defaults without touching the filesystem.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Collection that `/documents` writes to and `/ask_pdf` reads from.
    #[serde(default = "default_documents_collection")]
    pub documents_collection: String,
    /// Collection shared by the URL and text-file ingestion paths and `/rag`.
    #[serde(default = "default_knowledge_collection")]
    pub knowledge_collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            documents_collection: default_documents_collection(),
            knowledge_collection: default_knowledge_collection(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}
fn default_documents_collection() -> String {
    "pdf".to_string()
}
fn default_knowledge_collection() -> String {
    "rag-chroma".to_string()
}

/// Unit that `chunk_size` and `overlap` are measured in.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    Chars,
    Tokens,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkSpec {
    pub chunk_size: usize,
    pub overlap: usize,
    pub unit: SizeUnit,
}

/// A `[chunking.*]` table as written; missing keys keep the section default.
#[derive(Debug, Deserialize)]
struct ChunkSpecOverride {
    chunk_size: Option<usize>,
    overlap: Option<usize>,
    unit: Option<SizeUnit>,
}

impl ChunkSpecOverride {
    fn over(self, base: ChunkSpec) -> ChunkSpec {
        ChunkSpec {
            chunk_size: self.chunk_size.unwrap_or(base.chunk_size),
            overlap: self.overlap.unwrap_or(base.overlap),
            unit: self.unit.unwrap_or(base.unit),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_pdf_chunking", deserialize_with = "pdf_chunking")]
    pub pdf: ChunkSpec,
    #[serde(default = "default_text_chunking", deserialize_with = "text_chunking")]
    pub text: ChunkSpec,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            pdf: default_pdf_chunking(),
            text: default_text_chunking(),
        }
    }
}

fn default_pdf_chunking() -> ChunkSpec {
    ChunkSpec {
        chunk_size: 2000,
        overlap: 400,
        unit: SizeUnit::Chars,
    }
}
fn default_text_chunking() -> ChunkSpec {
    ChunkSpec {
        chunk_size: 1000,
        overlap: 50,
        unit: SizeUnit::Tokens,
    }
}

fn pdf_chunking<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ChunkSpec, D::Error> {
    Ok(ChunkSpecOverride::deserialize(d)?.over(default_pdf_chunking()))
}
fn text_chunking<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ChunkSpec, D::Error> {
    Ok(ChunkSpecOverride::deserialize(d)?.over(default_text_chunking()))
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Similarity,
    Mmr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks scored by the relevance probe.
    #[serde(default = "default_relevance_k")]
    pub relevance_k: usize,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda")]
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_k: default_relevance_k(),
            relevance_threshold: default_relevance_threshold(),
            strategy: default_strategy(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda: default_lambda(),
        }
    }
}

fn default_relevance_k() -> usize {
    3
}
fn default_relevance_threshold() -> f32 {
    0.1
}
fn default_strategy() -> StrategyKind {
    StrategyKind::Mmr
}
fn default_k() -> usize {
    5
}
fn default_fetch_k() -> usize {
    20
}
fn default_lambda() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_conversation_k")]
    pub retrieval_k: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            retrieval_k: default_conversation_k(),
        }
    }
}

fn default_conversation_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Turns kept per session; a user/assistant exchange is two turns.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("mxbai-embed-large".to_string())
}
fn default_embedding_dims() -> Option<usize> {
    Some(1024)
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            temperature: default_temperature(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3.2".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_llm_retries() -> u32 {
    2
}
fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Permits in the call gate shared by all model, embedding and index calls.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_concurrent_calls: default_max_concurrent_calls(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_max_concurrent_calls() -> usize {
    8
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Config {
    /// All defaults. Used by tests and when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    for (name, spec) in [
        ("chunking.pdf", &config.chunking.pdf),
        ("chunking.text", &config.chunking.text),
    ] {
        if spec.chunk_size == 0 {
            bail!("{}.chunk_size must be > 0", name);
        }
        if spec.overlap >= spec.chunk_size {
            bail!("{}.overlap must be smaller than chunk_size", name);
        }
    }

    let retrieval = &config.retrieval;
    if retrieval.relevance_k < 1 {
        bail!("retrieval.relevance_k must be >= 1");
    }
    if retrieval.k < 1 {
        bail!("retrieval.k must be >= 1");
    }
    if retrieval.fetch_k < retrieval.k {
        bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&retrieval.lambda) {
        bail!("retrieval.lambda must be in [0.0, 1.0]");
    }
    if config.conversation.retrieval_k < 1 {
        bail!("conversation.retrieval_k must be >= 1");
    }
    if config.memory.max_turns < 2 {
        bail!("memory.max_turns must be >= 2");
    }
    if config.server.max_concurrent_calls < 1 {
        bail!("server.max_concurrent_calls must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.chunking.pdf.chunk_size, 2000);
        assert_eq!(cfg.chunking.pdf.overlap, 400);
        assert_eq!(cfg.chunking.text.unit, SizeUnit::Tokens);
        assert_eq!(cfg.retrieval.strategy, StrategyKind::Mmr);
        assert!((cfg.retrieval.relevance_threshold - 0.1).abs() < 1e-6);
        assert!((cfg.retrieval.lambda - 0.7).abs() < 1e-6);
        assert_eq!(cfg.index.knowledge_collection, "rag-chroma");
    }

    #[test]
    fn test_overlap_must_be_below_size() {
        let cfg: Config = toml::from_str(
            r#"
[chunking.text]
chunk_size = 100
overlap = 100
unit = "tokens"
"#,
        )
        .unwrap();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("chunking.text.overlap"), "got: {}", err);
    }

    #[test]
    fn test_fetch_k_below_k_rejected() {
        let cfg: Config = toml::from_str(
            r#"
[retrieval]
k = 10
fetch_k = 5
"#,
        )
        .unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_lambda_out_of_range_rejected() {
        let cfg: Config = toml::from_str("[retrieval]\nlambda = 1.5\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_embedding_defaults_to_ollama() {
        let embedding = Config::minimal().embedding;
        assert_eq!(embedding.provider, "ollama");
        assert_eq!(embedding.model.as_deref(), Some("mxbai-embed-large"));
        assert_eq!(embedding.dims, Some(1024));
        assert!(embedding.is_enabled());

        let cfg: Config = toml::from_str("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert_eq!(cfg.embedding.model.as_deref(), Some("mxbai-embed-large"));
        validate(&Config::minimal()).unwrap();
    }

    #[test]
    fn test_enabled_embedding_requires_dims() {
        let cfg: Config = toml::from_str("[embedding]\nprovider = \"ollama\"\ndims = 0\n").unwrap();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("embedding.dims"), "got: {}", err);

        let mut cfg = Config::minimal();
        cfg.embedding.model = None;
        assert!(validate(&cfg).is_err());

        let cfg: Config = toml::from_str("[embedding]\nprovider = \"disabled\"\ndims = 0\n").unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_partial_chunking_override_keeps_section_defaults() {
        let cfg: Config = toml::from_str("[chunking.pdf]\nchunk_size = 1500\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.chunking.pdf.chunk_size, 1500);
        assert_eq!(cfg.chunking.pdf.overlap, 400);
        assert_eq!(cfg.chunking.pdf.unit, SizeUnit::Chars);

        let cfg: Config = toml::from_str("[chunking.text]\noverlap = 10\n").unwrap();
        assert_eq!(cfg.chunking.text.chunk_size, 1000);
        assert_eq!(cfg.chunking.text.overlap, 10);
        assert_eq!(cfg.chunking.text.unit, SizeUnit::Tokens);
    }

    #[test]
    fn test_unknown_llm_provider_rejected() {
        let cfg: Config = toml::from_str("[llm]\nprovider = \"gpt4all\"\n").unwrap();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("gpt4all"));
    }
}
