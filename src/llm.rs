//! Chat-completion providers.
//!
//! | Config value | Model | Credentials |
//! |--------------|-------|-------------|
//! | `"gemini"`   | [`GeminiModel`], `generateContent` | `GOOGLE_API_KEY` |
//! | `"openai"`   | [`OpenAIChatModel`], `/v1/chat/completions` | `OPENAI_API_KEY` |
//! | `"ollama"`   | [`OllamaChatModel`], `/api/chat` | none |
//! | `"disabled"` | [`DisabledModel`], every call fails | none |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::retry;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the assistant's reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct DisabledModel;

#[async_trait]
impl ChatModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("Chat model is disabled; set [llm] provider in the config")
    }
}

// ============ Gemini ============

pub struct GeminiModel {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: retry::client(config.timeout_secs)?,
        })
    }
}

/// Gemini takes system text separately and calls the assistant `model`.
fn gemini_request(messages: &[ChatMessage], temperature: f32) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let contents: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| {
            let role = match m.role {
                MessageRole::Assistant => "model",
                _ => "user",
            };
            serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": { "temperature": temperature },
    });
    if !system.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": system.join("\n\n") }]
        });
    }
    body
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            anyhow::anyhow!("Gemini returned no answer: {}", reason)
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing content");
            anyhow::anyhow!("Gemini returned no answer: {}", reason)
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait]
impl ChatModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = gemini_request(messages, self.temperature);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let json = retry::send_json("Gemini", self.max_retries, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;
        parse_gemini_response(&json)
    }
}

// ============ OpenAI ============

pub struct OpenAIChatModel {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: retry::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let json = retry::send_json("OpenAI", self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

pub struct OllamaChatModel {
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: retry::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let json = retry::send_json("Ollama", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await?;

        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message content"))
    }
}

/// Builds the chat model named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "gemini" => Ok(Arc::new(GeminiModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_request_separates_system_text() {
        let body = gemini_request(
            &[
                ChatMessage::system("Be brief."),
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello"),
                ChatMessage::user("Bye"),
            ],
            0.2,
        );
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "Bye");
    }

    #[test]
    fn gemini_request_without_system_has_no_instruction() {
        let body = gemini_request(&[ChatMessage::user("Hi")], 0.0);
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn gemini_response_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{"text": "Thirty "}, {"text": "days."}] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "Thirty days.");
    }

    #[test]
    fn gemini_blocked_prompt_is_an_error() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_response(&json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let v = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(v, serde_json::json!({"role": "assistant", "content": "ok"}));
    }

    #[tokio::test]
    async fn disabled_model_fails() {
        assert!(DisabledModel
            .complete(&[ChatMessage::user("hi")])
            .await
            .is_err());
    }
}
