//! Core data models shared by ingestion, retrieval and the answer service.

use serde::{Deserialize, Serialize};

/// Text produced by a loader before splitting.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// File name, URL or path the text came from.
    pub source: String,
    /// 1-based page number for paged sources (PDF).
    pub page: Option<u32>,
    pub text: String,
}

/// A bounded slice of a [`RawDocument`]'s text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned from the index together with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Counts returned by every ingestion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Loaded documents (PDF pages, or one per web page / text file).
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One entry in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Where an answer's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Document,
    GeneralKnowledge,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Document => "document",
            Provenance::GeneralKnowledge => "general_knowledge",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_wire_names() {
        assert_eq!(
            serde_json::to_value(Provenance::GeneralKnowledge).unwrap(),
            serde_json::json!("general_knowledge")
        );
        assert_eq!(Provenance::Document.as_str(), "document");
    }
}
