//! Cache-first and network-first strategies
//!
//! Bucket failures never fail a fetch: a failed lookup counts as a miss and
//! a failed write is a missed caching opportunity.

use swstore::{Bucket, StoredResponse};
use tracing::{debug, warn};

use crate::error::Result;
use crate::fetch::{Destination, Request, Response, ResponseSource};
use crate::network::Network;
use crate::route::RouteTable;
use crate::stats::WorkerStats;

/// Document served to navigations when the network is gone
pub struct OfflineFallback<'a> {
    /// Bucket holding the document
    pub bucket: &'a Bucket,
    /// Cache key of the document
    pub key: String,
}

fn lookup(bucket: &Bucket, key: &str) -> Option<StoredResponse> {
    match bucket.get(key) {
        Ok(found) => found,
        Err(e) => {
            warn!(bucket = bucket.name(), key, error = %e, "cache lookup failed, treating as miss");
            None
        }
    }
}

fn store(bucket: &Bucket, key: &str, response: &Response, stats: &WorkerStats) {
    match bucket.put(key, &response.to_stored()) {
        Ok(()) => {
            stats.record_stored();
            debug!(bucket = bucket.name(), key, "stored response");
        }
        Err(e) => {
            warn!(bucket = bucket.name(), key, error = %e, "dropped cache write");
        }
    }
}

/// The offline document, for navigations only
fn offline_document(
    request: &Request,
    offline: Option<&OfflineFallback<'_>>,
    stats: &WorkerStats,
) -> Option<Response> {
    if !request.is_navigation() {
        return None;
    }
    let fallback = offline?;
    let stored = lookup(fallback.bucket, &fallback.key)?;
    stats.record_offline_fallback();
    Some(Response::from_stored(stored, ResponseSource::Fallback))
}

/// Serve from `bucket` when present; otherwise fetch and store 2xx responses
pub async fn cache_first(
    request: &Request,
    bucket: &Bucket,
    network: &dyn Network,
    stats: &WorkerStats,
    offline: Option<&OfflineFallback<'_>>,
) -> Result<Response> {
    let key = request.cache_key();

    if let Some(stored) = lookup(bucket, &key) {
        stats.record_hit();
        return Ok(Response::from_stored(stored, ResponseSource::Cache));
    }
    stats.record_miss();

    match network.fetch(request).await {
        Ok(mut response) => {
            response.source = ResponseSource::Network;
            if response.ok() {
                store(bucket, &key, &response, stats);
            }
            Ok(response)
        }
        Err(err) => {
            if let Some(response) = offline_document(request, offline, stats) {
                warn!(key, error = %err, "network failed, serving offline document");
                return Ok(response);
            }
            Err(err.into())
        }
    }
}

/// Fetch first and store 2xx responses; fall back to `bucket` on failure,
/// then to the offline document for navigations
pub async fn network_first(
    request: &Request,
    bucket: &Bucket,
    network: &dyn Network,
    stats: &WorkerStats,
    offline: Option<&OfflineFallback<'_>>,
) -> Result<Response> {
    let key = request.cache_key();

    match network.fetch(request).await {
        Ok(mut response) => {
            response.source = ResponseSource::Network;
            if response.ok() {
                store(bucket, &key, &response, stats);
            }
            Ok(response)
        }
        Err(err) => {
            if let Some(stored) = lookup(bucket, &key) {
                stats.record_network_fallback();
                warn!(key, error = %err, "network failed, serving cached copy");
                return Ok(Response::from_stored(stored, ResponseSource::Cache));
            }

            if let Some(response) = offline_document(request, offline, stats) {
                warn!(key, error = %err, "network failed, serving offline document");
                return Ok(response);
            }

            if request.destination == Destination::Image || RouteTable::is_image(request) {
                stats.record_synthetic();
                return Ok(Response::not_found());
            }

            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::test_support::{url, MockNetwork};
    use swstore::CacheStorage;
    use tempfile::TempDir;
    use url::Url;

    fn get(path: &str) -> Request {
        Request::get(Url::parse(&url(path)).unwrap())
    }

    struct Setup {
        _dir: TempDir,
        storage: CacheStorage,
        network: std::sync::Arc<MockNetwork>,
        stats: WorkerStats,
    }

    fn setup() -> Setup {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open(dir.path()).unwrap();
        Setup {
            _dir: dir,
            storage,
            network: MockNetwork::new(),
            stats: WorkerStats::new(),
        }
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let s = setup();
        let bucket = s.storage.open_bucket("static-v1").unwrap();
        s.network.respond(&url("/about.html"), 200, "about");

        let request = get("/about.html");
        let response = cache_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(
            bucket.get(&request.cache_key()).unwrap().unwrap().body,
            b"about"
        );
        assert_eq!(s.stats.misses(), 1);
        assert_eq!(s.stats.stored(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let s = setup();
        let bucket = s.storage.open_bucket("static-v1").unwrap();
        s.network.respond(&url("/css/main.css"), 200, "body{}");

        let request = get("/css/main.css");
        let first = cache_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();
        let second = cache_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();
        let third = cache_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();

        assert_eq!(s.network.call_count(&url("/css/main.css")), 1);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(first.body, second.body);
        assert_eq!(second.body, third.body);
        assert_eq!(s.stats.hits(), 2);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_errors() {
        let s = setup();
        let bucket = s.storage.open_bucket("static-v1").unwrap();
        s.network.respond(&url("/missing.html"), 404, "nope");

        let request = get("/missing.html");
        let response = cache_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(bucket.is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_navigation_gets_offline_document() {
        let s = setup();
        let bucket = s.storage.open_bucket("static-v1").unwrap();
        let offline_key = get("/offline.html").cache_key();
        bucket
            .put(&offline_key, &StoredResponse::new(200, "offline"))
            .unwrap();
        s.network.fail(&url("/contact.html"));

        let fallback = OfflineFallback {
            bucket: &bucket,
            key: offline_key,
        };
        let request = get("/contact.html").with_destination(Destination::Document);
        let response = cache_first(
            &request,
            &bucket,
            s.network.as_ref(),
            &s.stats,
            Some(&fallback),
        )
        .await
        .unwrap();

        assert_eq!(response.source, ResponseSource::Fallback);
        assert_eq!(response.body.as_ref(), b"offline");
        assert_eq!(s.stats.offline_fallbacks(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_subresource_failure_propagates() {
        let s = setup();
        let bucket = s.storage.open_bucket("static-v1").unwrap();
        let offline_key = get("/offline.html").cache_key();
        bucket
            .put(&offline_key, &StoredResponse::new(200, "offline"))
            .unwrap();
        s.network.fail(&url("/js/core.js"));

        let fallback = OfflineFallback {
            bucket: &bucket,
            key: offline_key,
        };
        let request = get("/js/core.js").with_destination(Destination::Script);
        let result = cache_first(
            &request,
            &bucket,
            s.network.as_ref(),
            &s.stats,
            Some(&fallback),
        )
        .await;

        assert!(matches!(result, Err(WorkerError::Network(_))));
    }

    #[tokio::test]
    async fn test_network_first_overwrites_cached_copy() {
        let s = setup();
        let bucket = s.storage.open_bucket("dynamic-v1").unwrap();
        let request = get("/api/offers");
        bucket
            .put(&request.cache_key(), &StoredResponse::new(200, "old"))
            .unwrap();
        s.network.respond(&url("/api/offers"), 200, "new");

        let response = network_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();

        assert_eq!(response.body.as_ref(), b"new");
        assert_eq!(
            bucket.get(&request.cache_key()).unwrap().unwrap().body,
            b"new"
        );
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let s = setup();
        let bucket = s.storage.open_bucket("dynamic-v1").unwrap();
        let request = get("/api/offers");
        bucket
            .put(&request.cache_key(), &StoredResponse::new(200, "cached"))
            .unwrap();
        s.network.set_offline(true);

        let response = network_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body.as_ref(), b"cached");
        assert_eq!(s.stats.network_fallbacks(), 1);
    }

    #[tokio::test]
    async fn test_network_first_image_without_copy_is_404() {
        let s = setup();
        let bucket = s.storage.open_bucket("dynamic-v1").unwrap();
        s.network.set_offline(true);

        let request = get("/assets/banner.png");
        let response = network_first(&request, &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());
        assert_eq!(s.stats.synthetic(), 1);
    }

    #[tokio::test]
    async fn test_network_first_other_without_copy_propagates() {
        let s = setup();
        let bucket = s.storage.open_bucket("dynamic-v1").unwrap();
        s.network.set_offline(true);

        let result = network_first(
            &get("/api/offers"),
            &bucket,
            s.network.as_ref(),
            &s.stats,
            None,
        )
        .await;

        assert!(matches!(result, Err(WorkerError::Network(_))));
    }

    #[tokio::test]
    async fn test_network_first_navigation_gets_offline_document() {
        let s = setup();
        let static_bucket = s.storage.open_bucket("static-v1").unwrap();
        let dynamic_bucket = s.storage.open_bucket("dynamic-v1").unwrap();
        let offline_key = get("/offline.html").cache_key();
        static_bucket
            .put(&offline_key, &StoredResponse::new(200, "offline"))
            .unwrap();
        s.network.set_offline(true);

        let fallback = OfflineFallback {
            bucket: &static_bucket,
            key: offline_key,
        };
        let request = get("/services").with_destination(Destination::Document);
        let response = network_first(
            &request,
            &dynamic_bucket,
            s.network.as_ref(),
            &s.stats,
            Some(&fallback),
        )
        .await
        .unwrap();

        assert_eq!(response.source, ResponseSource::Fallback);
        assert_eq!(response.body.as_ref(), b"offline");
        assert_eq!(s.stats.offline_fallbacks(), 1);
        assert_eq!(s.stats.network_fallbacks(), 0);
    }

    #[tokio::test]
    async fn test_network_first_prefers_cached_copy_over_offline_document() {
        let s = setup();
        let bucket = s.storage.open_bucket("dynamic-v1").unwrap();
        let offline_key = get("/offline.html").cache_key();
        bucket
            .put(&offline_key, &StoredResponse::new(200, "offline"))
            .unwrap();
        let request = get("/services").with_destination(Destination::Document);
        bucket
            .put(&request.cache_key(), &StoredResponse::new(200, "services"))
            .unwrap();
        s.network.set_offline(true);

        let fallback = OfflineFallback {
            bucket: &bucket,
            key: offline_key,
        };
        let response = network_first(
            &request,
            &bucket,
            s.network.as_ref(),
            &s.stats,
            Some(&fallback),
        )
        .await
        .unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body.as_ref(), b"services");
    }

    #[tokio::test]
    async fn test_deleted_bucket_degrades_to_network() {
        let s = setup();
        let bucket = s.storage.open_bucket("static-v1").unwrap();
        s.storage.delete("static-v1").unwrap();
        s.network.respond(&url("/index.html"), 200, "home");

        let response = cache_first(&get("/index.html"), &bucket, s.network.as_ref(), &s.stats, None)
            .await
            .unwrap();

        assert_eq!(response.body.as_ref(), b"home");
        assert_eq!(s.stats.stored(), 0);
    }
}
