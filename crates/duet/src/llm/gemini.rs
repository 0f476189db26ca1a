//! Google Gemini provider using the native `streamGenerateContent` API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LLMError, error_for_response};
use super::provider::{OnToken, ProviderAdapter, ProviderError, drain_tokens};
use super::sse::{Payload, token_stream};
use crate::conversation::Turn;
use crate::conversation::history::{Speaker, fold_runs};

pub struct GeminiProvider {
    client: Client,
    tag: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    max_output_tokens: Option<u32>,
}

impl GeminiProvider {
    pub fn new(
        client: Client,
        tag: String,
        base_url: String,
        model: String,
        api_key: Option<String>,
        api_key_env: String,
        max_output_tokens: Option<u32>,
    ) -> Self {
        Self {
            client,
            tag,
            base_url,
            model,
            api_key,
            api_key_env,
            max_output_tokens,
        }
    }

    async fn stream(
        &self,
        history: &[Turn],
        on_token: OnToken<'_>,
    ) -> Result<String, LLMError> {
        let Some(ref api_key) = self.api_key else {
            return Err(LLMError::MissingApiKey(self.api_key_env.clone()));
        };

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = Request {
            contents: to_contents(history),
            generation_config: self.max_output_tokens.map(|max| GenerationConfig {
                max_output_tokens: max,
            }),
        };

        debug!(provider = %self.tag, model = %self.model, turns = history.len(), "Sending stream request");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        drain_tokens(token_stream(response.bytes_stream(), parse_payload), on_token).await
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
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
#[serde(rename_all = "camelCase")]
struct Request<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

/// Gemini wants strictly alternating roles, so adjacent turns that fold to
/// the same speaker become one content with several parts.
fn to_contents(history: &[Turn]) -> Vec<Content<'_>> {
    fold_runs(history)
        .into_iter()
        .map(|(speaker, texts)| Content {
            role: match speaker {
                Speaker::User => "user",
                Speaker::Model => "model",
            },
            parts: texts.into_iter().map(|text| Part { text }).collect(),
        })
        .collect()
}

// --- Streaming types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<StreamFailure>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamFailure {
    message: String,
}

fn parse_payload(data: &str) -> Result<Payload, LLMError> {
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        debug!(data, "Skipping unrecognised stream payload");
        return Ok(Payload::Skip);
    };

    if let Some(failure) = chunk.error {
        return Err(LLMError::Stream(failure.message));
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LLMError::Stream(format!("prompt blocked: {reason}")));
        }
        return Ok(Payload::Skip);
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|part| !part.thought)
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        Ok(Payload::Skip)
    } else {
        Ok(Payload::Token(text))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::conversation::Slot;
    use crate::llm::testing::mock_server;

    fn provider(base_url: String) -> GeminiProvider {
        GeminiProvider::new(
            Client::new(),
            "gemini".into(),
            base_url,
            "gemini-1.5-flash".into(),
            Some("g-key".into()),
            "GEMINI_API_KEY".into(),
            Some(4000),
        )
    }

    #[test]
    fn history_folds_models_into_one_content() {
        let history = vec![
            Turn::user("hello"),
            Turn::model(Slot::A, "hi A"),
            Turn::model(Slot::B, "hi B"),
            Turn::user("again"),
        ];
        let contents = to_contents(&history);
        assert_eq!(
            contents,
            vec![
                Content {
                    role: "user",
                    parts: vec![Part { text: "hello" }],
                },
                Content {
                    role: "model",
                    parts: vec![Part { text: "hi A" }, Part { text: "hi B" }],
                },
                Content {
                    role: "user",
                    parts: vec![Part { text: "again" }],
                },
            ]
        );
    }

    #[test]
    fn request_serialization() {
        let history = vec![Turn::user("Hi")];
        let request = Request {
            contents: to_contents(&history),
            generation_config: Some(GenerationConfig {
                max_output_tokens: 4000,
            }),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"contents":[{"role":"user","parts":[{"text":"Hi"}]}],"generationConfig":{"maxOutputTokens":4000}}"#
        );
    }

    #[test]
    fn parses_candidate_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"},"index":0}],"modelVersion":"gemini-1.5-flash"}"#;
        assert_eq!(parse_payload(data).unwrap(), Payload::Token("Hello".into()));
    }

    #[test]
    fn thought_parts_are_skipped() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"thinking...","thought":true}],"role":"model"}}]}"#;
        assert_eq!(parse_payload(data).unwrap(), Payload::Skip);
    }

    #[test]
    fn final_chunk_without_text_is_skipped() {
        let data = r#"{"candidates":[{"content":{"role":"model"},"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":12}}"#;
        assert_eq!(parse_payload(data).unwrap(), Payload::Skip);
    }

    #[test]
    fn blocked_prompt_fails() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_payload(data).unwrap_err();
        assert_eq!(err.to_string(), "stream error: prompt blocked: SAFETY");
    }

    #[test]
    fn error_payload_fails() {
        let data = r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        let err = parse_payload(data).unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_request() {
        let provider = GeminiProvider::new(
            Client::new(),
            "gemini".into(),
            "http://127.0.0.1:9".into(),
            "gemini-1.5-flash".into(),
            None,
            "GEMINI_API_KEY".into(),
            None,
        );
        let on_token = |_: &str| {};
        let err = provider
            .invoke(&[Turn::user("hi")], "hi", &on_token)
            .await
            .unwrap_err();
        assert_eq!(err.provider, "gemini");
        assert!(matches!(err.error, LLMError::MissingApiKey(_)));
    }

    #[tokio::test]
    async fn invoke_streams_tokens_over_http() {
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"h\"}],\"role\":\"model\"}}]}\r\n\r\n\
                    data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"i\"}],\"role\":\"model\"},\"finishReason\":\"STOP\"}]}\r\n\r\n";
        let (base_url, requests) = mock_server(StatusCode::OK, body).await;
        let provider = provider(base_url);

        let history = vec![
            Turn::user("hello"),
            Turn::model(Slot::A, "hi A"),
            Turn::model(Slot::B, "hi B"),
            Turn::user("again"),
        ];
        let seen = Mutex::new(Vec::new());
        let on_token = |chunk: &str| seen.lock().unwrap().push(chunk.to_string());
        let full = provider.invoke(&history, "again", &on_token).await.unwrap();
        assert_eq!(full, "hi");
        assert_eq!(*seen.lock().unwrap(), vec!["h", "i"]);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(
            request.uri.path(),
            "/v1beta/models/gemini-1.5-flash:streamGenerateContent"
        );
        assert_eq!(request.uri.query(), Some("alt=sse"));
        assert_eq!(request.headers["x-goog-api-key"], "g-key");
        assert_eq!(
            request.body["contents"][1],
            json!({"role": "model", "parts": [{"text": "hi A"}, {"text": "hi B"}]})
        );
        assert_eq!(request.body["generationConfig"]["maxOutputTokens"], 4000);
    }

    #[tokio::test]
    async fn server_error_surfaces_status_and_body() {
        let (base_url, _requests) =
            mock_server(StatusCode::SERVICE_UNAVAILABLE, "model overloaded").await;
        let on_token = |_: &str| {};
        let err = provider(base_url)
            .invoke(&[Turn::user("hi")], "hi", &on_token)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "gemini error: api error (status 503): model overloaded"
        );
    }
}
