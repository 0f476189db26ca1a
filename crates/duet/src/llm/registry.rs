//! Builds the two provider adapters from configuration.

use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use super::gemini::GeminiProvider;
use super::openai::OpenAICompatibleProvider;
use super::provider::ProviderAdapter;
use crate::config::{ProviderConfig, ProviderKind, ProvidersConfig};
use crate::conversation::Slot;

/// A configured adapter plus the label its column is shown under.
#[derive(Clone)]
pub struct ProviderEntry {
    pub label: String,
    pub adapter: Arc<dyn ProviderAdapter>,
}

/// The two fixed providers, one per column.
#[derive(Clone)]
pub struct ProviderPair {
    pub a: ProviderEntry,
    pub b: ProviderEntry,
}

impl ProviderPair {
    pub fn new(a: ProviderEntry, b: ProviderEntry) -> Self {
        Self { a, b }
    }

    /// Build both adapters, reading API keys from the environment.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let client = Client::new();
        Self {
            a: build_entry(&client, Slot::A, &config.a),
            b: build_entry(&client, Slot::B, &config.b),
        }
    }

    pub fn get(&self, slot: Slot) -> &ProviderEntry {
        match slot {
            Slot::A => &self.a,
            Slot::B => &self.b,
        }
    }
}

fn build_entry(client: &Client, slot: Slot, config: &ProviderConfig) -> ProviderEntry {
    let api_key = std::env::var(&config.api_key_env).ok();
    if api_key.is_none() {
        warn!(
            slot = %slot,
            provider = %config.tag,
            "{} is not set; requests to this provider will fail",
            config.api_key_env
        );
    }

    let adapter: Arc<dyn ProviderAdapter> = match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(
            client.clone(),
            config.tag.clone(),
            config.base_url.clone(),
            config.model.clone(),
            api_key,
            config.api_key_env.clone(),
            config.max_output_tokens,
        )),
        ProviderKind::OpenaiCompatible => Arc::new(OpenAICompatibleProvider::new(
            client.clone(),
            config.tag.clone(),
            config.base_url.clone(),
            config.model.clone(),
            api_key,
            config.max_output_tokens,
        )),
    };
    info!(slot = %slot, provider = %config.tag, model = %config.model, "Registered provider");

    ProviderEntry {
        label: config.label.clone(),
        adapter,
    }
}
