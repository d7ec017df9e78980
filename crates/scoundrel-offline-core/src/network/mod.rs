//! Network access for the cache manager.
//!
//! The `Network` trait is the only way the worker reaches the outside world.
//! `HttpNetwork` is the real implementation on top of reqwest;
//! `OfflineNetwork` fails every request and stands in for a disconnected
//! device.

pub mod error;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Request, Response};

pub use error::NetworkError;
pub use http::HttpNetwork;

#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request and buffer the whole response.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

#[async_trait]
impl<N: Network + ?Sized> Network for Arc<N> {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        (**self).fetch(request).await
    }
}

/// A network with no connectivity.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineNetwork;

#[async_trait]
impl Network for OfflineNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        Err(NetworkError::Unreachable(request.url.to_string()))
    }
}
