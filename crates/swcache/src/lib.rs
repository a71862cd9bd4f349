//! # swcache
//!
//! Versioned offline cache worker for a static site.
//!
//! ## Architecture
//! - **RouteTable**: ordered rules mapping a request to bypass, cache-first
//!   or network-first against the static or dynamic bucket
//! - **CacheWorker**: one generation; precaches on install, prunes other
//!   generations on activate, then answers fetches
//! - **Registration**: active and waiting slots, promotion on skip-waiting
//!
//! Storage goes through [`swstore::CacheStorage`]; the network and the
//! page-facing side effects are traits so a daemon or a test can plug in.

#![warn(missing_docs)]

mod config;
mod error;
mod fetch;
mod host;
mod message;
mod network;
mod notification;
mod registration;
mod route;
mod state;
mod stats;
mod strategy;
mod worker;

#[cfg(test)]
mod test_support;

pub use config::{CacheNames, NotificationConfig, WorkerConfig};
pub use error::{NetworkError, Result, WorkerError};
pub use fetch::{Destination, Method, Request, Response, ResponseSource};
pub use host::WorkerHost;
pub use message::{Message, MessageReply};
pub use network::Network;
pub use notification::{
    ClickOutcome, Notification, NotificationAction, NotificationClick, ACTION_CLOSE,
    ACTION_EXPLORE,
};
pub use registration::Registration;
pub use route::{BucketKind, Route, RouteTable, Strategy};
pub use state::WorkerState;
pub use stats::{StatsSnapshot, WorkerStats};
pub use strategy::{cache_first, network_first, OfflineFallback};
pub use worker::CacheWorker;
