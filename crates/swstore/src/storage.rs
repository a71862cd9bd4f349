//! Cache storage: a directory of named buckets
//!
//! Directory layout:
//! - `<name>.bucket`: one append-only log per bucket
//! - `<name>.bucket.tmp`: compaction output, renamed over the log when done

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::bucket::{Bucket, BUCKET_EXT};
use crate::error::{Error, Result};

/// CacheStorage is the handle to every bucket under one directory
pub struct CacheStorage {
    /// Path to the storage directory
    dir: PathBuf,

    /// Open buckets by name
    buckets: RwLock<HashMap<String, Arc<Bucket>, RandomState>>,

    /// Sequence number handed to the next created bucket
    next_seq: AtomicU64,
}

impl CacheStorage {
    /// Open or create cache storage at the given directory
    ///
    /// Every `*.bucket` file found is opened eagerly so that
    /// [`CacheStorage::keys`] reflects what is on disk.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut buckets = HashMap::with_hasher(RandomState::new());
        let mut next_seq = 0;

        let tmp_suffix = format!(".{}.tmp", BUCKET_EXT);
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_tmp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&tmp_suffix));
            if is_tmp {
                // Interrupted compaction; the log it was built from is intact
                remove_leftover(&path, "removed interrupted compaction output");
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match Bucket::open(dir, name) {
                Ok(bucket) => {
                    next_seq = next_seq.max(bucket.created_seq() + 1);
                    buckets.insert(name.to_string(), Arc::new(bucket));
                }
                // Undecodable files can never be opened again; I/O failures may pass
                Err(e @ Error::Parse(_)) => {
                    warn!(path = %path.display(), error = %e, "discarding unreadable bucket");
                    remove_leftover(&path, "removed unreadable bucket");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping bucket");
                }
            }
        }

        info!(dir = %dir.display(), buckets = buckets.len(), "cache storage opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            buckets: RwLock::new(buckets),
            next_seq: AtomicU64::new(next_seq),
        })
    }

    /// Storage directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Open the named bucket, creating it if it does not exist
    pub fn open_bucket(&self, name: &str) -> Result<Arc<Bucket>> {
        if let Some(bucket) = self.buckets.read().get(name) {
            return Ok(Arc::clone(bucket));
        }

        let mut buckets = self.buckets.write();
        if let Some(bucket) = buckets.get(name) {
            return Ok(Arc::clone(bucket));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let bucket = Arc::new(Bucket::create(&self.dir, name, seq)?);
        buckets.insert(name.to_string(), Arc::clone(&bucket));
        Ok(bucket)
    }

    /// Get an existing bucket without creating it
    pub fn bucket(&self, name: &str) -> Result<Arc<Bucket>> {
        self.buckets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BucketNotFound(name.to_string()))
    }

    /// Check whether a bucket exists
    pub fn has(&self, name: &str) -> bool {
        self.buckets.read().contains_key(name)
    }

    /// Delete a bucket and its file, returning whether it existed
    ///
    /// Outstanding handles to the bucket fail with [`Error::Closed`].
    pub fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.buckets.write().remove(name);
        match removed {
            Some(bucket) => {
                bucket.close();
                fs::remove_file(bucket.path())?;
                debug!(bucket = name, "deleted bucket");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Names of all buckets in creation order
    pub fn keys(&self) -> Vec<String> {
        let buckets = self.buckets.read();
        let mut named: Vec<(u64, &String)> = buckets
            .iter()
            .map(|(name, bucket)| (bucket.created_seq(), name))
            .collect();
        named.sort();
        named.into_iter().map(|(_, name)| name.clone()).collect()
    }
}

fn remove_leftover(path: &Path, what: &str) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "{}", what),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale file"),
    }
}
