//! OpenAI-compatible chat client (LM Studio, llama.cpp server, vLLM)

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{http_client, post_json, trim_base, ChatClient, ChatError, ChatReply, ChatRequest, Result};

pub struct OpenAiCompatibleClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    /// `base_url` includes the version prefix, e.g. `http://localhost:1234/v1`.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: format!("{}/chat/completions", trim_base(base_url)),
            api_key: api_key.filter(|k| !k.is_empty()),
            client: http_client(timeout)?,
        })
    }
}

pub(crate) fn request_body(request: &ChatRequest) -> Value {
    json!({
        "model": request.model,
        "messages": request.messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

pub(crate) fn parse_reply(body: &Value, requested_model: &str) -> Result<ChatReply> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ChatError::Parse("missing choices[0].message.content".to_string()))?;
    let model = body["model"].as_str().unwrap_or(requested_model);
    Ok(ChatReply {
        content: content.to_string(),
        model: model.to_string(),
    })
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let mut builder = self.client.post(&self.url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let body = post_json(builder, &request_body(request)).await?;
        parse_reply(&body, &request.model)
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
