//! HTTP client for the chat endpoint that produces model responses.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::errors::StreamError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body posted to the chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub provider: &'a str,
    pub model: &'a str,
}

pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    provider: String,
    model: String,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            provider: config.provider.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatRequest<'a> {
        ChatRequest {
            messages,
            provider: &self.provider,
            model: &self.model,
        }
    }

    /// Post the conversation and return the response, whose body is the
    /// streamed assistant message (`Response::bytes_stream`).
    pub async fn send(&self, messages: &[ChatMessage]) -> Result<reqwest::Response, StreamError> {
        debug!(endpoint = %self.endpoint, messages = messages.len(), "posting chat request");
        let mut req = self.http.post(&self.endpoint).json(&self.request(messages));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StreamError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}
