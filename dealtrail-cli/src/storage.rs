//! File-backed collaborators for the engine.
use async_trait::async_trait;
use dealtrail_engine::{KeyValueStore, SourceError, StoreError, VendorRecord, VendorSource};
use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Key-value store persisted as one JSON object on disk.
///
/// Each write rewrites the whole file through a temp file and rename, so a
/// reader sees either the old or the new map.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| {
                StoreError::Unavailable(format!("{} is not a store file: {err}", self.path.display()))
            }),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(unavailable(&self.path, &err)),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(map)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| unavailable(parent, &err))?;
        }
        let tmp = self.staging_path();
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|err| unavailable(&tmp, &err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| unavailable(&self.path, &err))
    }

    /// Sibling of the store file with `.tmp` appended to the full name.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn update<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R + Send,
    ) -> Result<R, StoreError>
    where
        R: Send,
    {
        let _held = self.guard.lock().await;
        let mut map = self.read_map().await?;
        let result = f(&mut map);
        self.write_map(&map).await?;
        Ok(result)
    }
}

fn unavailable(path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {err}", path.display()))
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _held = self.guard.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|map| {
            map.remove(key);
        })
        .await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError> {
        self.update(|map| {
            for key in keys {
                map.remove(key);
            }
        })
        .await
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let _held = self.guard.lock().await;
        Ok(self.read_map().await?.into_keys().collect())
    }
}

/// Vendor feed read from a JSON array on disk each time it is loaded.
#[derive(Debug, Clone)]
pub struct FileVendorSource {
    path: PathBuf,
}

impl FileVendorSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl VendorSource for FileVendorSource {
    async fn load_vendors(&self) -> Result<Vec<VendorRecord>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|err| SourceError::Unavailable(format!("{}: {err}", self.path.display())))?;
        let vendors: Vec<VendorRecord> = serde_json::from_str(&raw)?;
        log::debug!("loaded {} vendors from {}", vendors.len(), self.path.display());
        Ok(vendors)
    }
}
