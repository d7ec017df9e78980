//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use scoundrel_offline_core::{
    Cache, CacheStorage, MemoryStorage, Network, NetworkError, OfflineCacheManager, Request,
    Response, StorageError, WorkerConfig,
};
use tokio::sync::Notify;

pub const ORIGIN: &str = "https://play.example/";

#[derive(Clone)]
enum Reply {
    Serve { status: u16, body: String },
    Fail,
}

/// Network answering from a table of URLs. Unknown URLs fail like an
/// unreachable host.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Network serving the default app shell with 200s.
    pub fn with_app_shell() -> Arc<Self> {
        let network = Self::new();
        network.serve("./", 200, "<html>root</html>");
        network.serve("./index.html", 200, "<html>index</html>");
        network.serve("./css/main.css", 200, "body { color: black; }");
        network.serve("./manifest.json", 200, r#"{"name":"Scoundrel"}"#);
        network
    }

    pub fn serve(&self, path: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(
            url(path).to_string(),
            Reply::Serve {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn fail(&self, path: &str) {
        self.routes.lock().unwrap().insert(url(path).to_string(), Reply::Fail);
    }

    pub fn go_offline(&self) {
        let mut routes = self.routes.lock().unwrap();
        for reply in routes.values_mut() {
            *reply = Reply::Fail;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.calls().iter().filter(|c| **c == target).count()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let key = request.cache_key();
        self.calls.lock().unwrap().push(key.clone());
        let reply = self.routes.lock().unwrap().get(&key).cloned();
        match reply {
            Some(Reply::Serve { status, body }) => Ok(Response::new(key, status, body)),
            Some(Reply::Fail) | None => Err(NetworkError::Unreachable(key)),
        }
    }
}

/// Network that, while holding, parks every request until `release`.
pub struct GatedNetwork {
    inner: Arc<ScriptedNetwork>,
    holding: AtomicBool,
    gate: Notify,
}

impl GatedNetwork {
    pub fn new(inner: Arc<ScriptedNetwork>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            holding: AtomicBool::new(false),
            gate: Notify::new(),
        })
    }

    pub fn hold(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.holding.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let released = self.gate.notified();
        if self.holding.load(Ordering::SeqCst) {
            released.await;
        }
        self.inner.fetch(request).await
    }
}

/// Memory storage whose `delete` fails for one store name.
pub struct StuckStoreStorage {
    inner: MemoryStorage,
    stuck: String,
}

impl StuckStoreStorage {
    pub fn new(stuck: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::new(),
            stuck: stuck.to_string(),
        })
    }
}

#[async_trait]
impl CacheStorage for StuckStoreStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        self.inner.open(name).await
    }

    async fn open_existing(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError> {
        self.inner.open_existing(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        if name == self.stuck {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{name} is locked"),
            )));
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }
}

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn config(cache_name: &str) -> WorkerConfig {
    WorkerConfig {
        cache_name: cache_name.to_string(),
        ..WorkerConfig::with_scope(ORIGIN)
    }
}

pub fn manager(
    cache_name: &str,
    storage: &Arc<MemoryStorage>,
    network: &Arc<ScriptedNetwork>,
) -> OfflineCacheManager {
    OfflineCacheManager::new(&config(cache_name), storage.clone(), network.clone()).unwrap()
}

pub async fn cached_body(storage: &MemoryStorage, path: &str) -> Option<String> {
    storage
        .match_request(&Request::get(url(path)))
        .await
        .unwrap()
        .map(|r| r.text())
}

/// Number of polls before giving up on a background write
const POLL_ATTEMPTS: usize = 200;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Wait until the entry for `path` has body `expected`.
pub async fn wait_for_body(storage: &MemoryStorage, path: &str, expected: &str) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if cached_body(storage, path).await.as_deref() == Some(expected) {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}

/// Wait until any entry for `path` exists.
pub async fn wait_for_entry(storage: &MemoryStorage, path: &str) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if cached_body(storage, path).await.is_some() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}

/// Wait until `path` has been fetched at least `count` times.
pub async fn wait_for_calls(network: &ScriptedNetwork, path: &str, count: usize) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if network.call_count(path) >= count {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}
