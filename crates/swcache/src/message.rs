//! Commands posted to a worker and their replies

use serde::{Deserialize, Serialize};

/// Command carried by a message event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Promote this worker without waiting
    SkipWaiting,
    /// Ask for the running cache version
    GetVersion,
    /// Cache the secondary static resources
    CacheStaticResources,
}

/// Reply sent back over the message's reply channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageReply {
    /// Command accepted
    Ack,
    /// Current static cache name
    Version {
        /// e.g. `static-v1.0.0`
        version: String,
    },
    /// Secondary resources cached
    Cached {
        /// Number of entries written
        count: usize,
    },
    /// Command failed
    Error {
        /// Human readable cause
        message: String,
    },
}
