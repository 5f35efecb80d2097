//! Deterministic stand-ins for the embedding and chat providers.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::embedding::Embedder;
use crate::llm::{ChatMessage, ChatModel};

const FAKE_DIMS: usize = 1024;

/// Hashed bag-of-words vectors: texts sharing words score higher.
pub struct FakeEmbedder {
    name: String,
    embedded: AtomicUsize,
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::named("fake-embedder")
    }
}

impl FakeEmbedder {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            embedded: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far, queries excluded.
    pub fn embedded_texts(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; FAKE_DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let slot = u16::from_le_bytes([digest[0], digest[1]]) as usize % FAKE_DIMS;
            v[slot] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }
    fn dims(&self) -> usize {
        FAKE_DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }
}

/// Replies with canned answers in order and records every request.
/// Fails once the answers run out.
pub struct FakeChatModel {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChatModel {
    pub fn new<S: Into<String>>(replies: Vec<S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    fn model_name(&self) -> &str {
        "fake-chat"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => Ok(reply),
            None => bail!("fake chat model has no reply left"),
        }
    }
}
