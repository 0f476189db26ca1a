//! LLM error types.

use thiserror::Error;

/// Errors that can occur when calling a model provider.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The provider reported an error in the middle of a stream
    #[error("stream error: {0}")]
    Stream(String),

    /// No API key in the configured environment variable
    #[error("api key not set (expected in ${0})")]
    MissingApiKey(String),

    /// The adapter panicked
    #[error("provider adapter panicked")]
    Panicked,
}

/// Turn a non-success HTTP response into an [`LLMError::Api`].
pub(crate) async fn error_for_response(response: reqwest::Response) -> LLMError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    LLMError::Api { status, message }
}
