//! Durable key-value store seam.
//!
//! The engine never assumes multi-key atomicity: callers sequence dependent
//! writes and tolerate a partial sequence after a crash.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Failures surfaced by a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("value under `{key}` is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("value for `{key}` could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Platform key-value storage with per-key string values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write or overwrite a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove several values. No atomicity is implied.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    /// List every key currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Read and decode a JSON value.
///
/// # Errors
///
/// Returns an error if the store fails or the stored value does not decode.
pub async fn get_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })
}

/// Encode and write a JSON value.
///
/// # Errors
///
/// Returns an error if encoding fails or the store cannot be written.
pub async fn set_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, raw).await
}

/// In-process store, shared by clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> R {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.with_entries(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.with_entries(|entries| entries.insert(key.to_string(), value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.with_entries(|entries| entries.remove(key));
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            for key in keys {
                entries.remove(key);
            }
        });
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.with_entries(|entries| entries.keys().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        label: String,
        count: u32,
    }

    #[tokio::test]
    async fn json_helpers_roundtrip_through_memory_store() {
        let store = MemoryStore::new();
        let sample = Sample {
            label: "tacos".into(),
            count: 3,
        };
        set_json(&store, "sample", &sample).await.unwrap();
        let loaded: Option<Sample> = get_json(&store, "sample").await.unwrap();
        assert_eq!(loaded, Some(sample));
        let missing: Option<Sample> = get_json(&store, "missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn corrupt_values_are_reported_with_their_key() {
        let store = MemoryStore::new();
        store.set("broken", "{not json".into()).await.unwrap();
        let err = get_json::<Sample>(&store, "broken").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "broken"));
    }

    #[tokio::test]
    async fn multi_remove_ignores_missing_keys() {
        let store = MemoryStore::new();
        store.set("a", "1".into()).await.unwrap();
        store.set("b", "2".into()).await.unwrap();
        store
            .multi_remove(&["a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["b".to_string()]);
    }
}
