use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, ensure};

/// String key/value persistence injected into the layout store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        ensure!(!key.is_empty(), "storage key cannot be empty");
        ensure!(
            key.chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')),
            "storage key `{key}` contains unsupported characters"
        );
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("failed to read `{}`", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create `{}`", self.root.display()))?;

        // Staged write; readers only ever see a complete file.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)
            .with_context(|| format!("failed to write `{}`", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to replace `{}`", path.display()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{remove_dir_if_exists, temp_path};

    #[test]
    fn file_store_round_trips_values() {
        let root = temp_path("kv-roundtrip");
        let store = FileKeyValueStore::new(&root);

        assert_eq!(store.get("layout").expect("read should work"), None);
        store.set("layout", "{\"a\":1}").expect("write should work");
        assert_eq!(
            store.get("layout").expect("read should work").as_deref(),
            Some("{\"a\":1}")
        );
        store.set("layout", "{}").expect("overwrite should work");
        assert_eq!(store.get("layout").expect("read should work").as_deref(), Some("{}"));
        assert!(!root.join("layout.json.tmp").exists());

        remove_dir_if_exists(&root);
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let store = FileKeyValueStore::new(temp_path("kv-keys"));
        assert!(store.get("../escape").is_err());
        assert!(store.set("", "x").is_err());
    }

    #[test]
    fn memory_store_overwrites_entries() {
        let store = MemoryKeyValueStore::default();
        store.set("k", "one").expect("write should work");
        store.set("k", "two").expect("write should work");
        assert_eq!(store.get("k").expect("read should work").as_deref(), Some("two"));
        assert_eq!(store.get("other").expect("read should work"), None);
    }
}
