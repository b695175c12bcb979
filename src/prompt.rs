//! Prompt templates.
//!
//! Four shapes, one per answering path:
//!
//! | Function | Used by |
//! |----------|---------|
//! | [`document_prompt`] | `/ask_pdf` when retrieved context is relevant |
//! | [`general_prompt`] | `/ask_pdf` fallback |
//! | [`conversation_prompt`] | `/ollama` |
//! | [`rag_prompt`] | `/rag` |
//!
//! Nothing here truncates. Oversized context goes to the model as-is.

use crate::memory::render;
use crate::models::{ScoredChunk, Turn};

const DOCUMENT_TEMPLATE: &str = "\
<s>[INST] You are a knowledgeable assistant who can answer questions using both document information and general knowledge.

If the provided document context contains relevant information about the question, use it first.
If the question is unrelated to the document or the document doesn't contain relevant information, use your general knowledge to provide a complete answer.

Remember to:
1. Check if the document context is relevant to the question
2. If relevant, use document information and supplement with general knowledge
3. If not relevant, provide a comprehensive answer using your general knowledge[/INST]</s>
[INST] Question: {question}
Document Context: {context}

Please provide a direct answer.
[/INST]
";

const CONVERSATION_TEMPLATE: &str = "\
You are a friendly, engaging conversationalist.
Conversation history:
{history}

User: {prompt}
Your response:";

const RAG_TEMPLATE: &str = "\
Consider the following context and the user's input, and provide a response that best addresses the user's intent.

Context:
{context}

User input:
{question}

Always consider the last message, and stick to that context.
Your response should be in a bulleted form.
Your response:";

/// Joins chunk texts with blank lines.
pub fn render_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn document_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    fill(
        DOCUMENT_TEMPLATE,
        &[("question", question), ("context", &render_context(chunks))],
    )
}

pub fn general_prompt(question: &str) -> String {
    format!(
        "Please provide a comprehensive answer to this question: {}",
        question
    )
}

pub fn conversation_prompt(prompt: &str, history: Option<&[Turn]>) -> String {
    let history = match history {
        Some(turns) if !turns.is_empty() => render(turns),
        _ => "None".to_string(),
    };
    fill(
        CONVERSATION_TEMPLATE,
        &[("history", &history), ("prompt", prompt)],
    )
}

pub fn rag_prompt(question: &str, chunks: &[ScoredChunk], history: Option<&[Turn]>) -> String {
    let history = history.map(render).unwrap_or_default();
    let context = format!(
        "Document context:\n{}\n\nConversation history:\n{}",
        render_context(chunks),
        history
    );
    fill(RAG_TEMPLATE, &[("context", &context), ("question", question)])
}

/// Substitute `{name}` placeholders in one pass, so placeholder-like text
/// inside a value is never expanded.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v, close))
        });
        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: "c".to_string(),
            source: "s".to_string(),
            page: None,
            chunk_index: 0,
            text: text.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_document_prompt_contains_question_and_context() {
        let p = document_prompt(
            "What is the refund window?",
            &[scored("Refunds within 30 days."), scored("Keep receipts.")],
        );
        assert!(p.contains("Question: What is the refund window?"));
        assert!(p.contains("Document Context: Refunds within 30 days.\n\nKeep receipts."));
        assert!(p.contains("Please provide a direct answer."));
    }

    #[test]
    fn test_general_prompt() {
        assert_eq!(
            general_prompt("Why is the sky blue?"),
            "Please provide a comprehensive answer to this question: Why is the sky blue?"
        );
    }

    #[test]
    fn test_conversation_prompt_without_history() {
        let p = conversation_prompt("Hi", None);
        assert!(p.contains("Conversation history:\nNone"));
        assert!(p.contains("User: Hi\nYour response:"));
    }

    #[test]
    fn test_conversation_prompt_with_history() {
        let turns = vec![Turn::user("Hi"), Turn::assistant("Hello!")];
        let p = conversation_prompt("What did I just say?", Some(&turns));
        assert!(p.contains("User: Hi\nAssistant: Hello!"));
        assert!(p.contains("User: What did I just say?"));
    }

    #[test]
    fn test_rag_prompt_sections() {
        let turns = vec![Turn::user("Tell me about Rust")];
        let p = rag_prompt("And ownership?", &[scored("Ownership rules.")], Some(&turns));
        assert!(p.contains("Document context:\nOwnership rules."));
        assert!(p.contains("Conversation history:\nUser: Tell me about Rust"));
        assert!(p.contains("User input:\nAnd ownership?"));
        assert!(p.contains("bulleted"));
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let p = general_prompt("{context}");
        assert!(p.ends_with("{context}"));
        let p = conversation_prompt("use {history} literally", None);
        assert!(p.contains("User: use {history} literally"));
    }

    #[test]
    fn test_fill_leaves_unknown_braces() {
        assert_eq!(fill("a {x} {y} }", &[("x", "1")]), "a 1 {y} }");
    }
}
