//! Model provider clients for streaming chat completions.

mod error;
mod gemini;
mod openai;
mod provider;
mod registry;
mod sse;

#[cfg(test)]
pub(crate) mod testing;

pub use error::LLMError;
pub use gemini::GeminiProvider;
pub use openai::OpenAICompatibleProvider;
pub use provider::{OnToken, ProviderAdapter, ProviderError};
pub use registry::{ProviderEntry, ProviderPair};
