//! Named request/response cache stores.
//!
//! A `CacheStorage` owns a set of named stores; each store is opened as a
//! `Cache` handle. Two implementations are provided:
//!
//! - `MemoryStorage`: in-process maps, used by tests and short-lived hosts
//! - `DiskStorage`: one directory per store, one JSON file per entry
//!
//! Individual writes are serialised by the implementation. Consistency across
//! keys (for example "every app-shell entry is present") only holds once a
//! whole `add_all` batch has completed.

pub mod disk;
pub mod entry;
pub mod error;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Url;
use tracing::debug;

use crate::models::{Request, Response};
use crate::network::Network;

pub use disk::DiskStorage;
pub use entry::{CacheEntry, CachedData, StoredExchange};
pub use error::StorageError;
pub use memory::MemoryStorage;

/// Handle on one named store.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError>;

    async fn put(&self, request: &Request, response: Response) -> Result<(), StorageError>;

    async fn entries(&self) -> Result<Vec<CacheEntry>, StorageError>;

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries().await?.into_iter().map(|e| e.data.key).collect())
    }

    /// Fetch every URL and store the responses as one batch.
    ///
    /// All fetches run concurrently. A network failure or a non-2xx status on
    /// any of them fails the whole batch before anything is written.
    async fn add_all(&self, urls: &[Url], network: &dyn Network) -> Result<(), StorageError> {
        let requests: Vec<Request> = urls.iter().cloned().map(Request::get).collect();

        let fetches = requests.iter().map(|request| async move {
            let url = request.url.as_str();
            let response = network
                .fetch(request)
                .await
                .map_err(|source| StorageError::Fetch {
                    url: url.to_string(),
                    source,
                })?;
            if !response.is_ok() {
                return Err(StorageError::from_status(url, response.status, &response.text()));
            }
            Ok(response)
        });
        let responses = try_join_all(fetches).await?;

        for (request, response) in requests.iter().zip(responses) {
            self.put(request, response).await?;
        }
        debug!(cache = self.name(), count = requests.len(), "Stored batch");
        Ok(())
    }
}

/// The set of named stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the store called `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError>;

    /// Open the store called `name` only if it already exists.
    async fn open_existing(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError>;

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.open_existing(name).await?.is_some())
    }

    /// Delete the store called `name`, returning whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// Store names in creation order.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Look `request` up in every store, oldest first.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        for name in self.keys().await? {
            if let Some(cache) = self.open_existing(&name).await? {
                if let Some(response) = cache.match_request(request).await? {
                    return Ok(Some(response));
                }
            }
        }
        Ok(None)
    }
}
