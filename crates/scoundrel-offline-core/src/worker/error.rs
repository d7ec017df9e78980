use thiserror::Error;

use crate::cache::StorageError;
use crate::config::ConfigError;
use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install of {cache} failed: {source}")]
    InstallFailed {
        cache: String,
        #[source]
        source: StorageError,
    },

    #[error("Navigation to {url} failed and no fallback document is cached")]
    NavigationFallbackMiss { url: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker version {0} is not registered")]
    UnknownVersion(String),

    #[error("{event} handler did not complete: {reason}")]
    HandlerAborted { event: &'static str, reason: String },
}
