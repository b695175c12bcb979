//! Answer orchestration: retrieval, gating, prompting and memory.
//!
//! | Operation | Collection | Memory | Prompt |
//! |-----------|------------|--------|--------|
//! | [`AnswerService::complete`] | | | raw query |
//! | [`AnswerService::answer`] | documents | | document or general |
//! | [`AnswerService::converse`] | | read + append | conversation |
//! | [`AnswerService::rag`] | knowledge | read + append | combined |
//!
//! Model calls go through the shared [`CallGate`]. Retrieval calls go
//! through the gate inside [`Retriever`].

use std::sync::Arc;

use crate::config::Config;
use crate::error::ServiceResult;
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;
use crate::models::{Answer, Provenance};
use crate::pool::CallGate;
use crate::prompt;
use crate::retriever::{is_relevant, Retriever, Strategy};

pub struct AnswerService {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    memory: ConversationMemory,
    gate: CallGate,
    documents_collection: String,
    knowledge_collection: String,
    relevance_k: usize,
    relevance_threshold: f32,
    document_strategy: Strategy,
    conversation_k: usize,
}

impl AnswerService {
    pub fn new(
        config: &Config,
        retriever: Retriever,
        model: Arc<dyn LanguageModel>,
        gate: CallGate,
    ) -> Self {
        Self {
            retriever,
            model,
            memory: ConversationMemory::new(config.memory.max_turns),
            gate,
            documents_collection: config.index.documents_collection.clone(),
            knowledge_collection: config.index.knowledge_collection.clone(),
            relevance_k: config.retrieval.relevance_k,
            relevance_threshold: config.retrieval.relevance_threshold,
            document_strategy: Strategy::from_config(&config.retrieval),
            conversation_k: config.conversation.retrieval_k,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Send `query` to the model unchanged.
    pub async fn complete(&self, query: &str) -> ServiceResult<String> {
        self.ask_model(query).await
    }

    /// Answer from uploaded documents when they are relevant, otherwise
    /// from the model's general knowledge.
    pub async fn answer(&self, question: &str) -> ServiceResult<Answer> {
        let relevant = match self
            .retriever
            .retrieve(
                &self.documents_collection,
                question,
                Strategy::Similarity {
                    k: self.relevance_k,
                },
            )
            .await
        {
            Ok(probe) => {
                let relevant = is_relevant(&probe, self.relevance_threshold);
                tracing::debug!(
                    hits = probe.len(),
                    top_score = probe.first().map(|c| c.score).unwrap_or(0.0),
                    relevant,
                    "relevance probe"
                );
                relevant
            }
            Err(e) => {
                tracing::warn!("Relevance probe failed, answering from general knowledge: {:#}", e);
                false
            }
        };

        if relevant {
            let chunks = self
                .retriever
                .retrieve(&self.documents_collection, question, self.document_strategy)
                .await?;
            let text = self
                .ask_model(&prompt::document_prompt(question, &chunks))
                .await?;
            Ok(Answer {
                text,
                provenance: Provenance::Document,
            })
        } else {
            let text = self.ask_model(&prompt::general_prompt(question)).await?;
            Ok(Answer {
                text,
                provenance: Provenance::GeneralKnowledge,
            })
        }
    }

    /// Chat turn using the session's history. Records the exchange.
    pub async fn converse(&self, user_prompt: &str, session: &str) -> ServiceResult<String> {
        let history = self.memory.history(session);
        let full_prompt = prompt::conversation_prompt(user_prompt, history.as_deref());
        let reply = self.ask_model(&full_prompt).await?;
        self.memory.append_exchange(session, user_prompt, &reply);
        Ok(reply)
    }

    /// Knowledge-collection retrieval merged with the session's history.
    /// Records the exchange.
    pub async fn rag(&self, question: &str, session: &str) -> ServiceResult<String> {
        let chunks = self
            .retriever
            .retrieve(
                &self.knowledge_collection,
                question,
                Strategy::Similarity {
                    k: self.conversation_k,
                },
            )
            .await?;
        let history = self.memory.history(session);
        let full_prompt = prompt::rag_prompt(question, &chunks, history.as_deref());
        let reply = self.ask_model(&full_prompt).await?;
        self.memory.append_exchange(session, question, &reply);
        Ok(reply)
    }

    async fn ask_model(&self, full_prompt: &str) -> ServiceResult<String> {
        let reply = self
            .gate
            .run(self.model.complete(full_prompt))
            .await
            .map_err(|e| {
                tracing::error!(model = self.model.model_name(), "Model call failed: {:#}", e);
                e
            })?;
        Ok(reply)
    }
}
