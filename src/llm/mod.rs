//! LLM summaries of diffs and commit logs
//!
//! The backend is chosen from the API key prefix:
//!
//! | prefix    | backend                         |
//! |-----------|---------------------------------|
//! | `sk-ant-` | Anthropic Messages API          |
//! | `sk-or-`  | OpenRouter chat completions     |
//! | `sk-`     | DeepSeek chat completions       |
//!
//! Failures carry an HTTP-like status and are never fatal to the caller.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Largest input sent in one request, in characters
pub const MAX_CHUNK_CHARS: usize = 100_000;

/// Chunks summarized before the rest is dropped
pub const MAX_CHUNKS: usize = 5;

pub const TRUNCATED_MARKER: &str = "[truncated]";

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MODEL: &str = "claude-opus-4-20250514";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const OPENROUTER_MODEL: &str = "anthropic/claude-sonnet-4";
const DEEPSEEK_URL: &str = "https://api.deepseek.com/v1/chat/completions";
const DEEPSEEK_MODEL: &str = "deepseek-chat";
const MAX_TOKENS: u32 = 1024;

/// Summarization failure with an HTTP-like status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (status {status})")]
pub struct SummaryError {
    pub status: u16,
    pub message: String,
}

impl SummaryError {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenRouter,
    DeepSeek,
}

impl LlmBackend {
    pub fn from_key(key: &str) -> Result<Self, SummaryError> {
        if key.starts_with("sk-ant-") {
            Ok(Self::Anthropic)
        } else if key.starts_with("sk-or-") {
            Ok(Self::OpenRouter)
        } else if key.starts_with("sk-") {
            Ok(Self::DeepSeek)
        } else {
            Err(SummaryError::new(501, "Unknown LLM API key format"))
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            Self::Anthropic => ANTHROPIC_URL,
            Self::OpenRouter => OPENROUTER_URL,
            Self::DeepSeek => DEEPSEEK_URL,
        }
    }

    fn model(&self) -> &'static str {
        match self {
            Self::Anthropic => ANTHROPIC_MODEL,
            Self::OpenRouter => OPENROUTER_MODEL,
            Self::DeepSeek => DEEPSEEK_MODEL,
        }
    }
}

/// What the summary is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryKind {
    Changelog,
    Commit,
    Custom(String),
}

impl SummaryKind {
    pub fn prompt(&self) -> &str {
        match self {
            Self::Changelog => {
                "Summarize the provided changes as a short changelog. \
                 Keep only user-visible changes and group them as 'Added:', 'Changed:' and 'Fixed:' lines, \
                 one bullet point per change. Include a usage snippet only for new public API. \
                 Do not indent lines."
            }
            Self::Commit => {
                "Write a commit message for the provided changes. \
                 Start with one summary line, then bullet points for the individual changes, \
                 merging changes that are essentially the same. Plain text, no markdown headings."
            }
            Self::Custom(prompt) => prompt,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Summarizes text with the backend selected by the key
pub struct Summarizer {
    client: reqwest::Client,
    key: SecretString,
    backend: LlmBackend,
    endpoint: String,
}

impl Summarizer {
    /// Missing key → status 400, unknown key format → status 501
    pub fn new(key: Option<&SecretString>) -> Result<Self, SummaryError> {
        let key = key
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| SummaryError::new(400, "No LLM API key provided"))?;
        let backend = LlmBackend::from_key(key.expose_secret())?;
        Ok(Self {
            client: reqwest::Client::new(),
            key: key.clone(),
            backend,
            endpoint: backend.endpoint().to_string(),
        })
    }

    /// Send requests to `url` instead of the provider endpoint
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Summarize `text`, chunking inputs above [`MAX_CHUNK_CHARS`]
    pub async fn summarize(&self, kind: &SummaryKind, text: &str) -> Result<String, SummaryError> {
        let chunks = split_chunks(text, MAX_CHUNK_CHARS);
        log::info!(
            "Summarizing {} characters with {:?} ({} chunk(s))",
            text.chars().count(),
            self.backend,
            chunks.len()
        );

        if chunks.len() <= 1 {
            return self.request(kind.prompt(), text).await;
        }

        let mut parts = Vec::new();
        for chunk in chunks.iter().take(MAX_CHUNKS) {
            parts.push(self.request(kind.prompt(), chunk).await?);
        }
        if chunks.len() > MAX_CHUNKS {
            parts.push(TRUNCATED_MARKER.to_string());
        }
        Ok(parts.join("\n\n"))
    }

    async fn request(&self, prompt: &str, text: &str) -> Result<String, SummaryError> {
        let key = self.key.expose_secret();
        let builder = match self.backend {
            LlmBackend::Anthropic => self
                .client
                .post(&self.endpoint)
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.backend.model(),
                    "max_tokens": MAX_TOKENS,
                    "system": prompt,
                    "messages": [{ "role": "user", "content": text }],
                })),
            LlmBackend::OpenRouter | LlmBackend::DeepSeek => self
                .client
                .post(&self.endpoint)
                .bearer_auth(key)
                .json(&json!({
                    "model": self.backend.model(),
                    "max_tokens": MAX_TOKENS,
                    "temperature": 0.7,
                    "messages": [
                        { "role": "system", "content": prompt },
                        { "role": "user", "content": text },
                    ],
                })),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| SummaryError::new(500, format!("Fetch error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::new(status.as_u16(), format!("API error: {}", body)));
        }

        let summary = match self.backend {
            LlmBackend::Anthropic => response
                .json::<MessagesResponse>()
                .await
                .ok()
                .and_then(|r| r.content.into_iter().find_map(|block| block.text)),
            LlmBackend::OpenRouter | LlmBackend::DeepSeek => response
                .json::<ChatResponse>()
                .await
                .ok()
                .and_then(|r| r.choices.into_iter().next())
                .map(|choice| choice.message.content),
        };

        summary
            .map(|s| s.trim().to_string())
            .ok_or_else(|| SummaryError::new(502, "Unexpected response format"))
    }
}

/// Split on char boundaries into pieces of at most `max_chars` characters
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    if text.is_empty() || max_chars == 0 {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockServer;

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.into())
    }

    #[test]
    fn test_backend_from_key() {
        assert_eq!(LlmBackend::from_key("sk-ant-api03-x").unwrap(), LlmBackend::Anthropic);
        assert_eq!(LlmBackend::from_key("sk-or-v1-x").unwrap(), LlmBackend::OpenRouter);
        assert_eq!(LlmBackend::from_key("sk-123").unwrap(), LlmBackend::DeepSeek);
        assert_eq!(LlmBackend::from_key("ghp_123").unwrap_err().status, 501);
    }

    #[test]
    fn test_missing_key_is_400() {
        assert_eq!(Summarizer::new(None).err().unwrap().status, 400);
        assert_eq!(Summarizer::new(Some(&secret(" "))).err().unwrap().status, 400);
    }

    #[test]
    fn test_split_chunks_char_boundaries() {
        assert_eq!(split_chunks("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(split_chunks("abcd", 4), vec!["abcd"]);
        assert_eq!(split_chunks("", 4), vec![""]);
        assert_eq!(split_chunks("äöüßé", 2), vec!["äö", "üß", "é"]);
    }

    #[test]
    fn test_custom_prompt() {
        assert_eq!(SummaryKind::Custom("Haiku please".to_string()).prompt(), "Haiku please");
        assert!(SummaryKind::Changelog.prompt().contains("changelog"));
    }

    #[tokio::test]
    async fn test_deepseek_request() {
        let server = MockServer::start(200, r#"{"choices":[{"message":{"content":"  - Fixed X\n"}}]}"#).await;
        let summarizer = Summarizer::new(Some(&secret("sk-deepseek")))
            .unwrap()
            .with_endpoint(format!("{}/v1/chat/completions", server.url));

        let summary = summarizer.summarize(&SummaryKind::Commit, "diff").await.unwrap();
        assert_eq!(summary, "- Fixed X");

        let request = &server.requests()[0];
        assert_eq!(request.header("authorization"), Some("Bearer sk-deepseek"));
        let body = request.json();
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["messages"][1]["content"], "diff");
    }

    #[tokio::test]
    async fn test_anthropic_request() {
        let server = MockServer::start(200, r#"{"content":[{"type":"text","text":"Added: Y"}]}"#).await;
        let summarizer = Summarizer::new(Some(&secret("sk-ant-key")))
            .unwrap()
            .with_endpoint(format!("{}/v1/messages", server.url));

        let summary = summarizer.summarize(&SummaryKind::Changelog, "diff").await.unwrap();
        assert_eq!(summary, "Added: Y");

        let request = &server.requests()[0];
        assert_eq!(request.header("x-api-key"), Some("sk-ant-key"));
        assert_eq!(request.header("anthropic-version"), Some(ANTHROPIC_VERSION));
        assert_eq!(request.json()["system"], SummaryKind::Changelog.prompt());
    }

    #[tokio::test]
    async fn test_http_error_keeps_status() {
        let server = MockServer::start(401, r#"{"error":"bad key"}"#).await;
        let summarizer = Summarizer::new(Some(&secret("sk-or-x")))
            .unwrap()
            .with_endpoint(server.url.clone());

        let err = summarizer.summarize(&SummaryKind::Commit, "diff").await.unwrap_err();
        assert_eq!(err.status, 401);
        assert!(err.message.contains("bad key"));
    }

    #[tokio::test]
    async fn test_large_input_is_chunked_and_truncated() {
        let server = MockServer::start(200, r#"{"choices":[{"message":{"content":"part"}}]}"#).await;
        let summarizer = Summarizer::new(Some(&secret("sk-x")))
            .unwrap()
            .with_endpoint(server.url.clone());

        let text = "x".repeat(MAX_CHUNK_CHARS * (MAX_CHUNKS + 1) + 1);
        let summary = summarizer.summarize(&SummaryKind::Changelog, &text).await.unwrap();

        assert_eq!(server.requests().len(), MAX_CHUNKS);
        assert_eq!(summary.matches("part").count(), MAX_CHUNKS);
        assert!(summary.ends_with(TRUNCATED_MARKER));
    }

    #[tokio::test]
    async fn test_network_failure_is_500() {
        let summarizer = Summarizer::new(Some(&secret("sk-x")))
            .unwrap()
            .with_endpoint("http://127.0.0.1:1/v1/chat/completions");
        let err = summarizer.summarize(&SummaryKind::Commit, "diff").await.unwrap_err();
        assert_eq!(err.status, 500);
    }
}
