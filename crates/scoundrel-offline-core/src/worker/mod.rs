//! The offline cache worker.
//!
//! A `ServiceWorker` handles the three lifecycle events a host dispatches to
//! it. `OfflineCacheManager` is the Scoundrel implementation: it precaches
//! the app shell on install, purges stale stores on activate, and answers
//! fetches with one of three policies:
//!
//! - non-GET or cross-origin: pass through untouched
//! - navigation: network first, cached fallback document on failure
//! - everything else: stale-while-revalidate

pub mod error;
pub mod manager;
pub mod scope;

use async_trait::async_trait;

use crate::models::{Request, Response, ResponseSource};

pub use error::WorkerError;
pub use manager::OfflineCacheManager;
pub use scope::WorkerScope;

/// Result of handling one fetch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The worker did not intercept; the host performs the request itself.
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
    /// Nothing cached and the network failed. A valid offline state, not a
    /// failure of the worker.
    Unavailable,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Respond { source, .. } => Some(*source),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ServiceWorker: Send + Sync {
    /// Version identifier; for the cache manager this is its store name.
    fn version(&self) -> &str;

    async fn install(&self, scope: &WorkerScope) -> Result<(), WorkerError>;

    async fn activate(&self, scope: &WorkerScope) -> Result<(), WorkerError>;

    async fn fetch(&self, request: Request) -> Result<FetchOutcome, WorkerError>;

    /// Called by the host once this version is redundant. A retired worker
    /// must not write to storage any more.
    fn retire(&self) {}
}
