//! Key-value persistence for session data.
//!
//! The store holds JSON values under string keys. Every write replaces the
//! whole value, so the last write wins.

use serde_json::Value;

mod error;
mod file;
mod memory;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;

/// Synchronous JSON key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &Value) -> StoreResult<()>;
}
