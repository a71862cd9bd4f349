//! # swstore
//!
//! Persistent cache buckets for the swcache offline worker.
//!
//! ## Architecture
//! - **CacheStorage**: a directory of named buckets, listed in creation order
//! - **Bucket**: append-only log of request key -> response records
//! - **Index**: AHash map from key to the live record's offset (O(1) lookup)
//!
//! Buckets survive restarts until deleted; a torn trailing record left by a
//! crash is discarded on open.

#![warn(missing_docs)]

mod bucket;
mod error;
mod record;
mod storage;

pub use bucket::Bucket;
pub use error::{Error, Result};
pub use record::StoredResponse;
pub use storage::CacheStorage;
