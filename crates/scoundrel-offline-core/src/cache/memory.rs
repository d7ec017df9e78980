//! In-process cache storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Cache, CacheEntry, CacheStorage, CachedData, StorageError, StoredExchange};
use crate::models::{Request, Response};

type Entries = Arc<RwLock<BTreeMap<String, CacheEntry>>>;

/// Stores live as long as the `MemoryStorage`. A handle whose store has been
/// deleted keeps working on its own detached entries; the store is not
/// recreated by writes through such a handle.
#[derive(Default)]
pub struct MemoryStorage {
    stores: RwLock<Vec<(String, Entries)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        let mut stores = self.stores.write().await;
        let entries = match stores.iter().find(|(n, _)| n == name) {
            Some((_, entries)) => entries.clone(),
            None => {
                let entries = Entries::default();
                stores.push((name.to_string(), entries.clone()));
                entries
            }
        };
        Ok(Arc::new(MemoryCache {
            name: name.to_string(),
            entries,
        }))
    }

    async fn open_existing(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError> {
        let stores = self.stores.read().await;
        Ok(stores.iter().find(|(n, _)| n == name).map(|(_, entries)| {
            Arc::new(MemoryCache {
                name: name.to_string(),
                entries: entries.clone(),
            }) as Arc<dyn Cache>
        }))
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|(n, _)| n != name);
        Ok(stores.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let stores = self.stores.read().await;
        Ok(stores.iter().map(|(n, _)| n.clone()).collect())
    }
}

struct MemoryCache {
    name: String,
    entries: Entries,
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&request.cache_key())
            .map(|entry| entry.data.response.clone()))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), StorageError> {
        let key = request.cache_key();
        let entry = CachedData::new(StoredExchange {
            key: key.clone(),
            method: request.method.to_string(),
            response,
        });
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, StorageError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}
