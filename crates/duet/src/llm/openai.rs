//! OpenAI-compatible LLM provider.
//!
//! Works with OpenAI, OpenRouter, Ollama, and other compatible APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LLMError, error_for_response};
use super::provider::{OnToken, ProviderAdapter, ProviderError, drain_tokens};
use super::sse::{Payload, token_stream};
use crate::conversation::Turn;
use crate::conversation::history::Speaker;

/// OpenAI-compatible provider (works for OpenAI, OpenRouter, Ollama).
pub struct OpenAICompatibleProvider {
    client: Client,
    tag: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: Option<u32>,
}

impl OpenAICompatibleProvider {
    pub fn new(
        client: Client,
        tag: String,
        base_url: String,
        model: String,
        api_key: Option<String>,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            client,
            tag,
            base_url,
            model,
            api_key,
            max_tokens,
        }
    }

    async fn stream(
        &self,
        history: &[Turn],
        on_token: OnToken<'_>,
    ) -> Result<String, LLMError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = StreamRequest {
            model: &self.model,
            messages: to_messages(history),
            max_tokens: self.max_tokens,
            stream: true,
        };

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        debug!(provider = %self.tag, model = %self.model, turns = history.len(), "Sending stream request");
        let response = req.json(&request).send().await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        drain_tokens(token_stream(response.bytes_stream(), parse_payload), on_token).await
    }
}

#[async_trait]
impl ProviderAdapter for OpenAICompatibleProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn invoke(
        &self,
        history: &[Turn],
        _prompt: &str,
        on_token: OnToken<'_>,
    ) -> Result<String, ProviderError> {
        self.stream(history, on_token)
            .await
            .map_err(|e| ProviderError::new(&self.tag, e))
    }
}

// --- Request types ---

#[derive(Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn to_messages(history: &[Turn]) -> Vec<ChatMessage<'_>> {
    history
        .iter()
        .map(|turn| ChatMessage {
            role: match Speaker::from(turn.role) {
                Speaker::User => "user",
                Speaker::Model => "assistant",
            },
            content: &turn.content,
        })
        .collect()
}

// --- Streaming types ---

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamFailure>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamFailure {
    message: String,
}

fn parse_payload(data: &str) -> Result<Payload, LLMError> {
    if data == "[DONE]" {
        return Ok(Payload::Done);
    }

    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        debug!(data, "Skipping unrecognised stream payload");
        return Ok(Payload::Skip);
    };

    if let Some(failure) = chunk.error {
        return Err(LLMError::Stream(failure.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .map_or(Payload::Skip, Payload::Token))
}
