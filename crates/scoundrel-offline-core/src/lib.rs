//! Scoundrel offline cache.
//!
//! Keeps the Scoundrel web app playable without a connection. A
//! `WorkerHost` dispatches install, activate and fetch events to an
//! `OfflineCacheManager`, which:
//!
//! - precaches the app shell into the `scoundrel-v1` store on install
//! - deletes every other store on activate
//! - serves navigations network-first with the cached `index.html` as fallback
//! - serves other same-origin GETs stale-while-revalidate
//!
//! Storage (`CacheStorage`) and network (`Network`) are traits so the same
//! worker runs against memory or disk, and against reqwest or a scripted
//! network in tests.

pub mod cache;
pub mod config;
pub mod host;
pub mod models;
pub mod network;
pub mod worker;

pub use cache::{Cache, CacheStorage, DiskStorage, MemoryStorage, StorageError};
pub use config::WorkerConfig;
pub use host::{ClientId, HostResponse, WorkerHost, WorkerState};
pub use models::{Request, RequestMode, Response, ResponseSource};
pub use network::{HttpNetwork, Network, NetworkError, OfflineNetwork};
pub use worker::{FetchOutcome, OfflineCacheManager, ServiceWorker, WorkerError, WorkerScope};
