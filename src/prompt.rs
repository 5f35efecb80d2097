//! Prompt templates for the conversational retrieval chain.

use crate::chat_history::{ChatTurn, Role};
use crate::models::ScoredChunk;

pub const QA_SYSTEM: &str = "You are a helpful assistant answering questions about a document \
the user uploaded. Use only the context provided. If the context does not contain the answer, \
say that you don't know instead of making one up. Keep answers concise.";

const CONDENSE_INSTRUCTION: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language. \
Reply with the standalone question only.";

/// Retrieved chunks, best match first and separated by blank lines, then
/// the question. Chunk text is inserted verbatim.
pub fn qa_prompt(chunks: &[ScoredChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nHelpful answer:",
        context, question
    )
}

pub fn condense_prompt(history: &[ChatTurn], question: &str) -> String {
    format!(
        "{}\n\nChat History:\n{}\nFollow Up Input: {}\nStandalone question:",
        CONDENSE_INSTRUCTION,
        format_history(history),
        question
    )
}

/// `Human:` / `Assistant:` lines, one per turn.
pub fn format_history(history: &[ChatTurn]) -> String {
    let mut out = String::new();
    for turn in history {
        let speaker = match turn.role {
            Role::User => "Human",
            Role::Assistant => "Assistant",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&turn.text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            text: text.into(),
            source: "a".into(),
            row: None,
            score,
        }
    }

    #[test]
    fn qa_prompt_includes_context_in_order() {
        let chunks = vec![
            scored("first", 0.9),
            scored("second", 0.5),
        ];
        let p = qa_prompt(&chunks, "why?");
        assert!(p.starts_with("Context:\nfirst\n\nsecond\n\n"));
        assert!(p.contains("Question: why?"));
    }

    #[test]
    fn condense_prompt_lists_turns() {
        let p = condense_prompt(
            &[ChatTurn::user("What is X?"), ChatTurn::assistant("X is Y.")],
            "and Z?",
        );
        assert!(p.contains("Chat History:\nHuman: What is X?\nAssistant: X is Y.\n"));
        assert!(p.contains("Follow Up Input: and Z?"));
    }

    #[test]
    fn placeholders_in_content_are_left_alone() {
        let p = qa_prompt(&[scored("use {question} and {context} here", 1.0)], "why?");
        assert!(p.contains("use {question} and {context} here"));
        assert_eq!(p.matches("why?").count(), 1);

        let p = condense_prompt(&[ChatTurn::user("what is {question}?")], "and Z?");
        assert!(p.contains("Human: what is {question}?"));
        assert_eq!(p.matches("and Z?").count(), 1);
    }
}
