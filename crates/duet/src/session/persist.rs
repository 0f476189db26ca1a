//! Mirrors history and prompt log into the key-value store.
//!
//! Stream status is never persisted; a reloaded session always starts with
//! both columns idle. Writes run on the blocking pool so a slow disk never
//! stalls a runtime worker.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::conversation::{Changes, SessionState, Turn};
use crate::store::KeyValueStore;

pub const HISTORY_KEY: &str = "conversationHistory";
pub const PROMPT_LOG_KEY: &str = "prevPrompts";

#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load history and prompt log. Missing or unreadable values load empty.
    pub fn load(&self) -> (Vec<Turn>, Vec<String>) {
        (self.read(HISTORY_KEY), self.read(PROMPT_LOG_KEY))
    }

    /// Write whichever of history and prompt log changed.
    ///
    /// Values are serialized up front; the store calls happen on the blocking
    /// pool and complete before this returns, so writes never reorder.
    /// Failures are logged and otherwise ignored.
    pub async fn save(&self, state: &SessionState, changes: Changes) {
        let mut writes = Vec::with_capacity(2);
        if changes.history {
            writes.extend(encode(HISTORY_KEY, &state.history));
        }
        if changes.prompt_log {
            writes.extend(encode(PROMPT_LOG_KEY, &state.prompt_log));
        }
        if writes.is_empty() {
            return;
        }

        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || {
            for (key, value) in writes {
                if let Err(e) = store.set(key, &value) {
                    warn!(key, error = %e, "Failed to persist value");
                }
            }
        })
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Persistence write task failed");
        }
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let value = match self.store.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted value");
                return T::default();
            }
        };
        serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(key, error = %e, "Ignoring malformed persisted value");
            T::default()
        })
    }
}

fn encode<T: Serialize + ?Sized>(key: &'static str, value: &T) -> Option<(&'static str, Value)> {
    serde_json::to_value(value)
        .inspect_err(|e| warn!(key, error = %e, "Failed to encode value"))
        .ok()
        .map(|json| (key, json))
}
