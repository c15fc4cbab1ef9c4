//! Chat-completion clients for the local and strong supervisor tiers
//!
//! Two wire formats are supported:
//!
//! - [`OpenAiCompatibleClient`]: `POST <base>/chat/completions`, used for
//!   LM Studio and any other OpenAI-compatible local server
//! - [`AnthropicClient`]: `POST <base>/v1/messages`
//!
//! Both sit behind the [`ChatClient`] trait so guidance producers can be
//! exercised with in-process fakes.

pub mod anthropic;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;

/// Errors from chat-completion calls
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Request(String),

    #[error("chat API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("chat response parse error: {0}")]
    Parse(String),

    #[error("API key not configured for {0}")]
    MissingApiKey(String),
}

impl ChatError {
    /// Network-level failure (connection refused, DNS, timeout)
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// One completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Completion text plus the model that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
}

/// A chat-completion backend
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// Endpoint description for log fields
    fn endpoint(&self) -> &str;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ChatError::Request(e.to_string()))
}

/// Send a JSON body and decode the JSON reply, mapping non-2xx to [`ChatError::Api`].
pub(crate) async fn post_json(
    builder: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let response = builder
        .json(body)
        .send()
        .await
        .map_err(|e| ChatError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::Api {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ChatError::Parse(e.to_string()))
}

pub(crate) fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }

    #[test]
    fn test_transport_classification() {
        assert!(ChatError::Request("connection refused".into()).is_transport());
        assert!(!ChatError::Api {
            status: 500,
            body: String::new()
        }
        .is_transport());
        assert!(!ChatError::MissingApiKey("anthropic".into()).is_transport());
    }

    #[test]
    fn test_trim_base() {
        assert_eq!(trim_base("http://localhost:1234/v1/"), "http://localhost:1234/v1");
    }
}
