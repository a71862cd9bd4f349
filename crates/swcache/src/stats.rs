//! Worker statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one worker generation
#[derive(Debug, Default)]
pub struct WorkerStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
    network_fallbacks: AtomicU64,
    offline_fallbacks: AtomicU64,
    synthetic: AtomicU64,
    bypassed: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Requests answered from a bucket by cache-first
    pub hits: u64,
    /// Cache-first lookups that went to the network
    pub misses: u64,
    /// Responses written to a bucket
    pub stored: u64,
    /// Network-first failures answered from a bucket
    pub network_fallbacks: u64,
    /// Navigations answered with the offline document
    pub offline_fallbacks: u64,
    /// Synthetic error responses
    pub synthetic: u64,
    /// Requests passed through without caching
    pub bypassed: u64,
    /// hits / (hits + misses)
    pub hit_ratio: f64,
}

impl WorkerStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache-first hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache-first miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response written to a bucket
    pub fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cached copy served after a network failure
    pub fn record_network_fallback(&self) {
        self.network_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an offline document served to a navigation
    pub fn record_offline_fallback(&self) {
        self.offline_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a synthetic response
    pub fn record_synthetic(&self) {
        self.synthetic.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a bypassed request
    pub fn record_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total stored responses
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Get total network fallbacks
    pub fn network_fallbacks(&self) -> u64 {
        self.network_fallbacks.load(Ordering::Relaxed)
    }

    /// Get total offline fallbacks
    pub fn offline_fallbacks(&self) -> u64 {
        self.offline_fallbacks.load(Ordering::Relaxed)
    }

    /// Get total synthetic responses
    pub fn synthetic(&self) -> u64 {
        self.synthetic.load(Ordering::Relaxed)
    }

    /// Get total bypassed requests
    pub fn bypassed(&self) -> u64 {
        self.bypassed.load(Ordering::Relaxed)
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Copy all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            stored: self.stored(),
            network_fallbacks: self.network_fallbacks(),
            offline_fallbacks: self.offline_fallbacks(),
            synthetic: self.synthetic(),
            bypassed: self.bypassed(),
            hit_ratio: self.hit_ratio(),
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.stored,
            &self.network_fallbacks,
            &self.offline_fallbacks,
            &self.synthetic,
            &self.bypassed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
