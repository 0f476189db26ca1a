//! Provider adapter trait.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use thiserror::Error;

use super::error::LLMError;
use crate::conversation::Turn;

/// Callback receiving each streamed chunk, in delivery order.
pub type OnToken<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// A provider failure, tagged with the provider it came from.
#[derive(Debug, Error)]
#[error("{provider} error: {error}")]
pub struct ProviderError {
    /// Tag of the failing provider, e.g. `gemini`.
    pub provider: String,
    #[source]
    pub error: LLMError,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, error: LLMError) -> Self {
        Self {
            provider: provider.into(),
            error,
        }
    }
}

/// A streaming chat backend.
///
/// `history` already ends with the user turn for `prompt`. Implementations
/// call `on_token` for every chunk and resolve to the full response text.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short tag identifying the provider in errors and logs.
    fn tag(&self) -> &str;

    async fn invoke(
        &self,
        history: &[Turn],
        prompt: &str,
        on_token: OnToken<'_>,
    ) -> Result<String, ProviderError>;
}

/// Forward every token to `on_token` and return their concatenation.
pub(crate) async fn drain_tokens<S>(mut tokens: S, on_token: OnToken<'_>) -> Result<String, LLMError>
where
    S: Stream<Item = Result<String, LLMError>> + Unpin,
{
    let mut full = String::new();
    while let Some(token) = tokens.next().await {
        let token = token?;
        if token.is_empty() {
            continue;
        }
        on_token(&token);
        full.push_str(&token);
    }
    Ok(full)
}
