//! # Docent
//!
//! A small retrieval-augmented question answering service. Documents (PDF
//! uploads, web pages, plain text) are split into chunks, embedded, and
//! stored in a SQLite vector index. Questions are answered by a language
//! model, grounded in retrieved chunks when they are relevant and in the
//! model's general knowledge otherwise.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Loaders    │──▶│   Ingestor   │──▶│  SQLite   │
//! │ PDF/Web/Txt │   │ Split+Embed  │   │  vectors  │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                   ┌──────────────┐   ┌─────▼─────┐
//!                   │ AnswerService│◀──│ Retriever │
//!                   │ gate+prompts │   │ sim / MMR │
//!                   └──────┬───────┘   └───────────┘
//!                          ▼
//!                   ┌──────────────┐
//!                   │ HTTP / CLI   │
//!                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent init
//! docent ingest pdf ./handbook.pdf
//! docent ask "What is the refund window?"
//! docent serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`loader`] | PDF, web page and text loaders |
//! | [`chunk`] | Recursive text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index trait, SQLite and in-memory stores |
//! | [`retriever`] | Similarity and MMR retrieval, relevance gate |
//! | [`prompt`] | Prompt templates |
//! | [`memory`] | Session-keyed conversation history |
//! | [`llm`] | Language model clients |
//! | [`http`] | Retry loop for outbound HTTP calls |
//! | [`pool`] | Call gate bounding concurrent collaborator calls |
//! | [`ingest`] | Ingestion pipeline |
//! | [`answer`] | Answer orchestration |
//! | [`server`] | HTTP server |
//! | [`stats`] | Index statistics |
//! | [`error`] | Service error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod http;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod pool;
pub mod prompt;
pub mod retriever;
pub mod server;
pub mod stats;
