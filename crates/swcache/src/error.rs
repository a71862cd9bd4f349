//! Error types for swcache

use crate::state::WorkerState;

/// Result type alias for worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Failure of a network fetch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// Connection refused, DNS failure, offline
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The request did not complete in time
    #[error("request timed out")]
    Timeout,

    /// Any other transport failure
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the worker and its registration
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Cache storage failure
    #[error("storage error: {0}")]
    Store(#[from] swstore::Error),

    /// Network failure that no strategy could recover from
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Lifecycle event delivered in the wrong state
    #[error("invalid worker state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the event requires
        expected: WorkerState,
        /// State the worker was in
        actual: WorkerState,
    },

    /// Precaching a static resource failed
    #[error("install failed for {url}: {reason}")]
    InstallFailed {
        /// Resource that could not be cached
        url: String,
        /// What went wrong
        reason: String,
    },

    /// Configuration rejected at load or build time
    #[error("invalid configuration: {0}")]
    Config(String),

    /// URL could not be parsed or resolved
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The host could not carry out a side effect
    #[error("host error: {0}")]
    Host(String),

    /// No worker is registered to receive the event
    #[error("no worker is registered")]
    NoWorker,
}
