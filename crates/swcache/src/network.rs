//! Network access used by the caching strategies

use async_trait::async_trait;

use crate::error::NetworkError;
use crate::fetch::{Request, Response};

/// The network stack behind the worker
///
/// Implementations return any HTTP response, including 4xx/5xx, as `Ok`;
/// `Err` means no response was obtained at all.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
