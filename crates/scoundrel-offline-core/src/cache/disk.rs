//! On-disk cache storage.
//!
//! ```text
//! {root}/
//!   {hex(store name)}/
//!     store.json            # name and creation time
//!     {sha256(key)}.json    # CachedData<StoredExchange>, body base64
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::{Cache, CacheEntry, CacheStorage, CachedData, StorageError, StoredExchange};
use crate::models::{Request, Response};

/// Per-store metadata file name
const STORE_META_FILE: &str = "store.json";

/// Suffix for entry files
const ENTRY_EXTENSION: &str = "json";

/// Distinguishes concurrent temporary files written by this process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMeta {
    name: String,
    created_at: DateTime<Utc>,
}

pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }

    fn handle(&self, name: &str) -> Arc<dyn Cache> {
        Arc::new(DiskCache {
            name: name.to_string(),
            dir: self.store_dir(name),
        })
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        let dir = self.store_dir(name);
        let meta_path = dir.join(STORE_META_FILE);
        if !path_exists(&meta_path).await {
            fs::create_dir_all(&dir).await?;
            let meta = StoreMeta {
                name: name.to_string(),
                created_at: Utc::now(),
            };
            write_json_atomic(&meta_path, &meta).await?;
            debug!(cache = name, "Created cache store");
        }
        Ok(self.handle(name))
    }

    async fn open_existing(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError> {
        if path_exists(&self.store_dir(name).join(STORE_META_FILE)).await {
            Ok(Some(self.handle(name)))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self.store_dir(name);
        if !path_exists(&dir).await {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).await?;
        debug!(cache = name, "Deleted cache store");
        Ok(true)
    }

    /// Stores without readable metadata are listed first, by name, so a
    /// purge can still remove them.
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut metas = Vec::new();
        let mut orphans = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = store_name_from_dir(&item.path()) else {
                continue;
            };
            let meta_path = item.path().join(STORE_META_FILE);
            if !path_exists(&meta_path).await {
                warn!(cache = %name, "Store has no metadata");
                orphans.push(name);
                continue;
            }
            match read_json::<StoreMeta>(&meta_path).await {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Store metadata unreadable");
                    orphans.push(name);
                }
            }
        }
        orphans.sort();
        metas.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        orphans.extend(metas.into_iter().map(|m| m.name));
        Ok(orphans)
    }
}

struct DiskCache {
    name: String,
    dir: PathBuf,
}

impl DiskCache {
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let path = self.entry_path(key);
        if !path_exists(&path).await {
            return Ok(None);
        }
        let entry: CacheEntry = read_json(&path).await?;
        if entry.data.key != key {
            warn!(cache = %self.name, key = key, stored = %entry.data.key, "Entry key mismatch");
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

#[async_trait]
impl Cache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        Ok(self
            .load(&request.cache_key())
            .await?
            .map(|entry| entry.data.response))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), StorageError> {
        let key = request.cache_key();
        let entry = CachedData::new(StoredExchange {
            key: key.clone(),
            method: request.method.to_string(),
            response,
        });
        // A deleted store has no directory, so the write fails instead of
        // recreating it.
        write_json_atomic(&self.entry_path(&key), &entry).await
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                && path.file_name().is_some_and(|n| n != STORE_META_FILE);
            if !is_entry {
                continue;
            }
            match read_json::<CacheEntry>(&path).await {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entry"),
            }
        }
        entries.sort_by(|a, b| a.data.key.cmp(&b.data.key));
        Ok(entries)
    }
}

/// Recover a store name from its hex-encoded directory name.
fn store_name_from_dir(dir: &Path) -> Option<String> {
    let encoded = dir.file_name()?.to_str()?;
    let bytes = hex::decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let contents = fs::read(path).await?;
    serde_json::from_slice(&contents).map_err(|source| StorageError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

/// Write to a sibling temporary file, then rename over `path`.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let contents = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension(format!(
        "tmp-{}-{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    fn request(path: &str) -> Request {
        Request::get(Url::parse("https://play.example/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_put_and_match_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let req = request("css/main.css");

        {
            let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
            let cache = storage.open("scoundrel-v1").await.unwrap();
            let response = Response::new(req.url.as_str(), 200, "body{}").with_header("Content-Type", "text/css");
            cache.put(&req, response).await.unwrap();
        }

        let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["scoundrel-v1".to_string()]);
        let cache = storage.open_existing("scoundrel-v1").await.unwrap().unwrap();
        let hit = cache.match_request(&req).await.unwrap().unwrap();
        assert_eq!(hit.text(), "body{}");
        assert_eq!(hit.content_type(), Some("text/css"));
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
        storage.open("scoundrel-v0").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage.open("scoundrel-v1").await.unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["scoundrel-v0".to_string(), "scoundrel-v1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_store_names_with_path_characters() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
        storage.open("../escape/v1").await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["../escape/v1".to_string()]);
        assert!(storage.delete("../escape/v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_store_is_not_recreated_by_put() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
        let cache = storage.open("scoundrel-v0").await.unwrap();
        let req = request("index.html");

        assert!(storage.delete("scoundrel-v0").await.unwrap());
        assert!(cache
            .put(&req, Response::new(req.url.as_str(), 200, "late"))
            .await
            .is_err());
        assert!(!storage.has("scoundrel-v0").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_skip_metadata_and_corrupt_files() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
        let cache = storage.open("scoundrel-v1").await.unwrap();
        let req = request("manifest.json");
        cache.put(&req, Response::new(req.url.as_str(), 200, "{}")).await.unwrap();

        let dir = tmp.path().join(hex::encode("scoundrel-v1"));
        std::fs::write(dir.join("garbage.json"), "not json").unwrap();

        let entries = cache.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data.key, req.cache_key());
        assert_eq!(entries[0].data.method, "GET");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error_on_match() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
        storage.open("scoundrel-v1").await.unwrap();
        let req = request("index.html");

        let digest = Sha256::digest(req.cache_key().as_bytes());
        let path = tmp
            .path()
            .join(hex::encode("scoundrel-v1"))
            .join(format!("{}.json", hex::encode(digest)));
        std::fs::write(path, "{").unwrap();

        let cache = storage.open_existing("scoundrel-v1").await.unwrap().unwrap();
        let err = cache.match_request(&req).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_keys_list_stores_with_broken_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(tmp.path().to_path_buf()).unwrap();
        storage.open("scoundrel-v1").await.unwrap();

        std::fs::create_dir(tmp.path().join(hex::encode("scoundrel-v0"))).unwrap();
        let corrupt = tmp.path().join(hex::encode("old-assets"));
        std::fs::create_dir(&corrupt).unwrap();
        std::fs::write(corrupt.join(STORE_META_FILE), "{").unwrap();
        std::fs::create_dir(tmp.path().join("not-hex")).unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec![
                "old-assets".to_string(),
                "scoundrel-v0".to_string(),
                "scoundrel-v1".to_string()
            ]
        );

        assert!(storage.delete("scoundrel-v0").await.unwrap());
        assert!(storage.delete("old-assets").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["scoundrel-v1".to_string()]);
    }
}
