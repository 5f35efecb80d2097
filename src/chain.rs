//! Conversational retrieval: condense, retrieve, answer.
//!
//! A follow-up question is first rewritten into a standalone question using
//! the chain's in-memory conversation buffer. The standalone question
//! drives top-k retrieval, and the retrieved chunks plus the question go
//! to the chat model. The buffer lives only as long as the chain; the
//! on-disk [`crate::chat_history`] store is separate.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::chat_history::ChatTurn;
use crate::index::VectorIndex;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::ScoredChunk;
use crate::prompt;

/// Session-scoped memory of the conversation.
#[derive(Debug, Default, Clone)]
pub struct ConversationBuffer {
    turns: Vec<ChatTurn>,
}

impl ConversationBuffer {
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn record(&mut self, question: &str, answer: &str) {
        self.turns.push(ChatTurn::user(question));
        self.turns.push(ChatTurn::assistant(answer));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainAnswer {
    pub answer: String,
    pub standalone_question: String,
    pub sources: Vec<ScoredChunk>,
}

pub struct ConversationalChain {
    index: Arc<VectorIndex>,
    model: Arc<dyn ChatModel>,
    k: usize,
    memory: ConversationBuffer,
}

impl ConversationalChain {
    /// A chain over `index` retrieving the top `k` chunks, with an empty
    /// buffer.
    pub fn new(index: Arc<VectorIndex>, model: Arc<dyn ChatModel>, k: usize) -> Self {
        Self {
            index,
            model,
            k,
            memory: ConversationBuffer::default(),
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn memory(&self) -> &ConversationBuffer {
        &self.memory
    }

    /// Answers `question`. The exchange is added to the buffer only when
    /// every step succeeds.
    pub async fn ask(&mut self, question: &str) -> Result<ChainAnswer> {
        let standalone_question = if self.memory.is_empty() {
            question.to_string()
        } else {
            let condensed = self
                .model
                .complete(&[ChatMessage::user(prompt::condense_prompt(
                    self.memory.turns(),
                    question,
                ))])
                .await?;
            let condensed = condensed.trim();
            if condensed.is_empty() {
                question.to_string()
            } else {
                condensed.to_string()
            }
        };
        tracing::debug!(question, standalone = %standalone_question, "retrieving");

        let sources = self
            .index
            .similarity_search(&standalone_question, self.k)
            .await?;

        let answer = self
            .model
            .complete(&[
                ChatMessage::system(prompt::QA_SYSTEM),
                ChatMessage::user(prompt::qa_prompt(&sources, &standalone_question)),
            ])
            .await?
            .trim()
            .to_string();

        self.memory.record(question, &answer);
        Ok(ChainAnswer {
            answer,
            standalone_question,
            sources,
        })
    }

    pub fn reset_memory(&mut self) {
        self.memory.clear();
    }
}
