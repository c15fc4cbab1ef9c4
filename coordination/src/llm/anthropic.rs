//! Anthropic Messages API client for strong-model consultation

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    http_client, post_json, trim_base, ChatClient, ChatError, ChatReply, ChatRequest, ChatRole,
    Result,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Fails with [`ChatError::MissingApiKey`] when the key is empty.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey("anthropic".to_string()));
        }
        Ok(Self {
            url: format!("{}/v1/messages", trim_base(base_url)),
            api_key: api_key.to_string(),
            client: http_client(timeout)?,
        })
    }
}

/// System messages move to the top-level `system` field.
pub(crate) fn request_body(request: &ChatRequest) -> Value {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let messages: Vec<&super::ChatMessage> = request
        .messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();

    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": messages,
    });
    if !system.is_empty() {
        body["system"] = Value::String(system.join("\n\n"));
    }
    body
}

/// Concatenates the text blocks of `content`.
pub(crate) fn parse_reply(body: &Value, requested_model: &str) -> Result<ChatReply> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| ChatError::Parse("missing content array".to_string()))?;
    let content: String = blocks
        .iter()
        .filter(|b| b["type"].as_str().unwrap_or("text") == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    let model = body["model"].as_str().unwrap_or(requested_model);
    Ok(ChatReply {
        content,
        model: model.to_string(),
    })
}

#[async_trait]
impl ChatClient for AnthropicClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let builder = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");
        let body = post_json(builder, &request_body(request)).await?;
        parse_reply(&body, &request.model)
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
