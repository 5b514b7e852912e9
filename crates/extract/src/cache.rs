use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::llm::ContextItem;

/// Content-addressed store of validated extraction payloads.
///
/// Entries are immutable once written and keyed by a digest of their inputs,
/// so concurrent readers always agree and concurrent writers of one key write
/// the same bytes. Disk writes go through a temp file and a rename, which makes
/// each key's write atomic. There is no eviction.
pub struct ContentCache {
    dir: Option<PathBuf>,
    entries: DashMap<String, Value>,
}

impl ContentCache {
    /// Process-local cache, gone on exit
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            entries: DashMap::new(),
        }
    }

    /// Durable cache with one JSON file per key under `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir: Some(dir),
            entries: DashMap::new(),
        })
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.entries.get(key) {
            return Some(value.value().clone());
        }

        let path = self.entry_path(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key = short(key), error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => {
                self.entries.insert(key.to_string(), value.clone());
                Some(value)
            }
            Err(e) => {
                warn!(key = short(key), error = %e, "Ignoring corrupt cache entry");
                None
            }
        }
    }

    pub async fn put(&self, key: &str, value: Value) -> Result<(), CacheError> {
        if let Some(path) = self.entry_path(key) {
            let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
            let bytes = serde_json::to_vec_pretty(&value)?;

            tokio::fs::write(&tmp, bytes).await?;
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e.into());
            }
            debug!(key = short(key), "Cache entry written");
        }

        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries_in_memory: self.entries.len(),
            persistent: self.dir.is_some(),
        }
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{}.json", key)))
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub entries_in_memory: usize,
    pub persistent: bool,
}

/// Digest over the prompt followed by each context item, in order.
pub fn cache_key(prompt: &str, context: &[ContextItem]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    for item in context {
        // Separator keeps ("ab", "c") and ("a", "bc") apart
        hasher.update([0x1f]);
        hasher.update(item.key_fragment().as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub(crate) fn short(key: &str) -> &str {
    &key[..key.len().min(10)]
}
