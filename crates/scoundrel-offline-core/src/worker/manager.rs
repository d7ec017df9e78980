use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Url;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{FetchOutcome, ServiceWorker, WorkerError, WorkerScope};
use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::models::{Request, Response, ResponseSource};
use crate::network::Network;

/// Offline cache manager for the Scoundrel web app.
///
/// Cloning is cheap; clones share the storage, the network, the retired
/// flag and the set of pending background writes.
#[derive(Clone)]
pub struct OfflineCacheManager {
    cache_name: Arc<String>,
    scope: Url,
    app_shell: Arc<Vec<Url>>,
    fallback: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    retired: Arc<AtomicBool>,
    background: Arc<Mutex<JoinSet<()>>>,
}

impl OfflineCacheManager {
    pub fn new(
        config: &WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Result<Self, WorkerError> {
        Ok(Self {
            cache_name: Arc::new(config.cache_name.clone()),
            scope: config.scope_url()?,
            app_shell: Arc::new(config.app_shell_urls()?),
            fallback: config.fallback_url()?,
            storage,
            network,
            retired: Arc::new(AtomicBool::new(false)),
            background: Arc::new(Mutex::new(JoinSet::new())),
        })
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn app_shell(&self) -> &[Url] {
        &self.app_shell
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Wait for every background refresh and cache write started so far.
    ///
    /// Short-lived hosts call this before shutting the runtime down so no
    /// write is cut off.
    pub async fn flush_writes(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.lock_background());
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    warn!(cache = %self.cache_name, error = %e, "Background task failed");
                }
            }
        }
    }

    fn lock_background(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `task` detached from the caller, tracked for `flush_writes`.
    fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut background = self.lock_background();
        // Reap finished tasks so the set does not grow without bound
        while background.try_join_next().is_some() {}
        background.spawn(task);
    }

    /// Network first; on failure serve the cached fallback document.
    async fn network_first(&self, request: Request) -> Result<FetchOutcome, WorkerError> {
        match self.network.fetch(&request).await {
            Ok(response) => {
                self.store_in_background(request, response.clone());
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation offline, trying fallback document");
                let fallback = Request::get(self.fallback.clone());
                let cached = match self.storage.match_request(&fallback).await {
                    Ok(cached) => cached,
                    Err(e) => {
                        warn!(url = %self.fallback, error = %e, "Failed to read fallback document");
                        None
                    }
                };
                match cached {
                    Some(response) => Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::Cache,
                    }),
                    None => Err(WorkerError::NavigationFallbackMiss {
                        url: request.url.to_string(),
                    }),
                }
            }
        }
    }

    /// Serve the cached entry immediately when there is one, refreshing it
    /// in the background; otherwise wait for the network.
    async fn stale_while_revalidate(&self, request: Request) -> Result<FetchOutcome, WorkerError> {
        let cached = match self.storage.match_request(&request).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        };

        if let Some(response) = cached {
            let manager = self.clone();
            self.spawn_background(async move {
                manager.revalidate(request).await;
            });
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store_in_background(request, response.clone());
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "No cached entry and network failed");
                Ok(FetchOutcome::Unavailable)
            }
        }
    }

    async fn revalidate(&self, request: Request) {
        match self.network.fetch(&request).await {
            Ok(response) if response.is_ok() => self.store(&request, response).await,
            Ok(response) => {
                debug!(url = %request.url, status = response.status, "Not refreshing entry from error response");
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Background refresh failed");
            }
        }
    }

    /// Detached write; completion is not observable by the caller.
    fn store_in_background(&self, request: Request, response: Response) {
        let manager = self.clone();
        self.spawn_background(async move {
            manager.store(&request, response).await;
        });
    }

    /// Write into this version's store, creating it if absent. Once retired
    /// the write is dropped so a store purged by a newer version stays
    /// deleted.
    async fn store(&self, request: &Request, response: Response) {
        if self.is_retired() {
            debug!(cache = %self.cache_name, url = %request.url, "Worker retired, dropping write");
            return;
        }
        let cache = match self.storage.open(&self.cache_name).await {
            Ok(cache) => cache,
            Err(e) => {
                warn!(cache = %self.cache_name, error = %e, "Failed to open store");
                return;
            }
        };
        if let Err(e) = cache.put(request, response).await {
            warn!(cache = %self.cache_name, url = %request.url, error = %e, "Failed to store response");
        } else {
            debug!(cache = %self.cache_name, url = %request.url, "Stored response");
        }
    }
}

#[async_trait]
impl ServiceWorker for OfflineCacheManager {
    fn version(&self) -> &str {
        &self.cache_name
    }

    async fn install(&self, scope: &WorkerScope) -> Result<(), WorkerError> {
        info!(cache = %self.cache_name, resources = self.app_shell.len(), "Precaching app shell");
        scope.skip_waiting();

        let cache = self.storage.open(&self.cache_name).await?;
        cache
            .add_all(&self.app_shell, self.network.as_ref())
            .await
            .map_err(|source| WorkerError::InstallFailed {
                cache: self.cache_name.to_string(),
                source,
            })?;

        info!(cache = %self.cache_name, "App shell cached");
        Ok(())
    }

    async fn activate(&self, scope: &WorkerScope) -> Result<(), WorkerError> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != self.cache_name.as_str())
            .collect();

        let deletions = stale.iter().map(|name| async move {
            match self.storage.delete(name).await {
                Ok(_) => info!(cache = %name, "Deleted stale cache"),
                Err(e) => warn!(cache = %name, error = %e, "Failed to delete stale cache"),
            }
        });
        join_all(deletions).await;

        scope.claim_clients();
        Ok(())
    }

    async fn fetch(&self, request: Request) -> Result<FetchOutcome, WorkerError> {
        if !request.is_get() {
            debug!(method = %request.method, url = %request.url, "Passing through non-GET request");
            return Ok(FetchOutcome::Passthrough);
        }
        if !request.is_same_origin(&self.scope) {
            debug!(url = %request.url, "Passing through cross-origin request");
            return Ok(FetchOutcome::Passthrough);
        }

        if request.is_navigation() {
            self.network_first(request).await
        } else {
            self.stale_while_revalidate(request).await
        }
    }

    fn retire(&self) {
        if !self.retired.swap(true, Ordering::SeqCst) {
            info!(cache = %self.cache_name, "Worker retired");
        }
    }
}
