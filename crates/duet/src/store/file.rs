//! File-backed store: one pretty-printed JSON file per key.
//!
//! Writes go to a temp file that is fsynced and then renamed over the final
//! path, so a crash never leaves a half-written value behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::error::{StoreError, StoreResult};
use super::KeyValueStore;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::file_io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(key)?;
        let contents = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::file_io(&path, e)),
        };
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let data = serde_json::to_vec_pretty(value)?;
        atomic_write_file(&path, &data)
    }
}

/// Write data to a temp file, fsync it, then atomically rename to the final path.
///
/// The temp file name carries a ULID so concurrent writers never collide.
fn atomic_write_file(final_path: &Path, data: &[u8]) -> StoreResult<()> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("value");
    let temp_path = final_path.with_file_name(format!("{}.{}.tmp", file_name, ulid::Ulid::new()));

    let mut file = fs::File::create(&temp_path).map_err(|e| StoreError::file_io(&temp_path, e))?;
    file.write_all(data)
        .map_err(|e| StoreError::file_io(&temp_path, e))?;
    file.sync_all()
        .map_err(|e| StoreError::file_io(&temp_path, e))?;
    fs::rename(&temp_path, final_path).map_err(|e| StoreError::file_io(final_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_key_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        assert!(store.get("conversationHistory").unwrap().is_none());
    }

    #[test]
    fn set_then_get_across_instances() {
        let tmp = TempDir::new().unwrap();
        let value = json!([{"role": "user", "content": "hello"}]);

        FileStore::open(tmp.path())
            .unwrap()
            .set("conversationHistory", &value)
            .unwrap();

        let reopened = FileStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.get("conversationHistory").unwrap(), Some(value));
        assert!(tmp.path().join("conversationHistory.json").exists());
    }

    #[test]
    fn set_overwrites_and_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.set("prevPrompts", &json!(["a"])).unwrap();
        store.set("prevPrompts", &json!(["a", "b"])).unwrap();

        assert_eq!(store.get("prevPrompts").unwrap(), Some(json!(["a", "b"])));
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn open_creates_nested_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("b");
        let store = FileStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn rejects_keys_that_escape_the_directory() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        for key in ["../outside", "a/b", "", "with space"] {
            assert!(matches!(
                store.set(key, &json!(1)),
                Err(StoreError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        fs::write(tmp.path().join("prevPrompts.json"), b"{not json").unwrap();
        assert!(matches!(store.get("prevPrompts"), Err(StoreError::Json(_))));
    }
}
