//! CacheWorker: one generation of the offline cache policy
//!
//! Lifecycle: `install` precaches the static list, `activate` prunes every
//! bucket from other generations, and from then on `handle_fetch` routes
//! each request through the rule table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::RwLock;
use swstore::{Bucket, CacheStorage, StoredResponse};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{CacheNames, WorkerConfig};
use crate::error::{Result, WorkerError};
use crate::fetch::{Request, Response, ResponseSource};
use crate::host::WorkerHost;
use crate::message::{Message, MessageReply};
use crate::network::Network;
use crate::notification::{ClickOutcome, Notification, NotificationClick};
use crate::route::{BucketKind, Route, RouteTable, Strategy};
use crate::state::WorkerState;
use crate::stats::WorkerStats;
use crate::strategy::{cache_first, network_first, OfflineFallback};

/// A single worker generation
pub struct CacheWorker {
    config: WorkerConfig,
    origin: Url,
    names: CacheNames,
    routes: RouteTable,

    storage: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    host: Arc<dyn WorkerHost>,

    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    stats: WorkerStats,
}

impl CacheWorker {
    /// Build a worker for `config` with the standard route table
    pub fn new(
        config: WorkerConfig,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn WorkerHost>,
    ) -> Result<Self> {
        let routes = RouteTable::standard(&config.third_party_hosts);
        Self::with_routes(config, routes, storage, network, host)
    }

    /// Build a worker with a custom route table
    pub fn with_routes(
        config: WorkerConfig,
        routes: RouteTable,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn WorkerHost>,
    ) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;
        let names = config.cache_names();

        Ok(Self {
            config,
            origin,
            names,
            routes,
            storage,
            network,
            host,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            stats: WorkerStats::new(),
        })
    }

    /// Version string reported to pages: the static cache name
    pub fn version(&self) -> &str {
        &self.names.static_name
    }

    /// Bucket names of this generation
    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    /// Configuration this worker was built from
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Fetch statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Whether the worker asked to skip the waiting phase
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    pub(crate) fn mark_redundant(&self) {
        let mut state = self.state.write();
        let from = *state;
        if !from.is_terminal() {
            info!(version = %self.names.static_name, %from, "worker is redundant");
            *state = WorkerState::Redundant;
        }
    }

    fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<()> {
        let mut state = self.state.write();
        if *state != expected {
            return Err(WorkerError::InvalidState {
                expected,
                actual: *state,
            });
        }
        *state = next;
        Ok(())
    }

    /// Fetch every URL in `paths` and return the cache entries, failing on
    /// the first network error or non-2xx status
    async fn fetch_all(&self, paths: &[String]) -> Result<Vec<(String, StoredResponse)>> {
        let requests = paths
            .iter()
            .map(|path| -> Result<Request> { Ok(Request::get(self.config.resolve(path)?)) })
            .collect::<Result<Vec<_>>>()?;

        let network = self.network.as_ref();
        let results = join_all(requests.iter().map(|request| network.fetch(request))).await;

        requests
            .iter()
            .zip(results)
            .map(|(request, result)| -> Result<(String, StoredResponse)> {
                let response = result.map_err(|e| WorkerError::InstallFailed {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                })?;
                if !response.ok() {
                    return Err(WorkerError::InstallFailed {
                        url: request.url.to_string(),
                        reason: format!("status {}", response.status),
                    });
                }
                Ok((request.cache_key(), response.to_stored()))
            })
            .collect()
    }

    /// Precache the static list into the static bucket
    ///
    /// Any failure leaves the worker `Redundant`; the bucket is not written
    /// unless every resource was fetched.
    pub async fn install(&self) -> Result<()> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        info!(version = %self.names.static_name, "installing worker");

        match self.precache().await {
            Ok(count) => {
                self.transition(WorkerState::Installing, WorkerState::Installed)?;
                if self.config.skip_waiting_on_install {
                    self.skip_waiting.store(true, Ordering::Release);
                }
                info!(version = %self.names.static_name, count, "critical resources cached");
                Ok(())
            }
            Err(e) => {
                error!(version = %self.names.static_name, error = %e, "install failed");
                self.mark_redundant();
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let static_bucket = self.storage.open_bucket(&self.names.static_name)?;
        self.storage.open_bucket(&self.names.dynamic_name)?;

        let entries = self.fetch_all(&self.config.precache).await?;
        static_bucket.put_all(&entries)?;
        static_bucket.sync()?;
        Ok(entries.len())
    }

    /// Delete every bucket that does not belong to this generation, then
    /// claim open clients
    pub async fn activate(&self) -> Result<()> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;
        info!(version = %self.names.static_name, "activating worker");

        for name in self.storage.keys() {
            if self.names.is_current(&name) {
                continue;
            }
            match self.storage.delete(&name) {
                Ok(_) => info!(bucket = %name, "deleted old cache"),
                Err(e) => warn!(bucket = %name, error = %e, "failed to delete old cache"),
            }
        }

        self.transition(WorkerState::Activating, WorkerState::Activated)?;

        if let Err(e) = self.host.claim_clients(&self.names.static_name).await {
            warn!(error = %e, "failed to claim clients");
        }
        info!(version = %self.names.static_name, "worker activated");
        Ok(())
    }

    /// A bucket of this generation, `None` once it has been deleted
    ///
    /// Never creates the bucket: a worker that lost its buckets to a newer
    /// generation's activation must not bring them back.
    fn bucket(&self, kind: BucketKind) -> Option<Arc<Bucket>> {
        let name = match kind {
            BucketKind::Static => &self.names.static_name,
            BucketKind::Dynamic => &self.names.dynamic_name,
        };
        match self.storage.bucket(name) {
            Ok(bucket) => Some(bucket),
            Err(e) => {
                debug!(bucket = %name, error = %e, "bucket unavailable");
                None
            }
        }
    }

    async fn passthrough(&self, request: &Request, source: ResponseSource) -> Result<Response> {
        self.network
            .fetch(request)
            .await
            .map(|mut response| {
                response.source = source;
                response
            })
            .map_err(WorkerError::from)
    }

    /// Answer an intercepted request
    pub async fn handle_fetch(&self, request: Request) -> Result<Response> {
        let state = self.state();
        if !state.can_intercept_fetch() {
            return Err(WorkerError::InvalidState {
                expected: WorkerState::Activated,
                actual: state,
            });
        }

        let started = Instant::now();
        let (rule, route) = self.routes.classify(&request);

        let result = match route {
            Route::Bypass => {
                self.stats.record_bypass();
                self.passthrough(&request, ResponseSource::Bypass).await
            }
            Route::Cache { strategy, bucket } => match self.bucket(bucket) {
                None => self.passthrough(&request, ResponseSource::Network).await,
                Some(bucket) => {
                    let static_bucket = match self.config.offline_fallback {
                        Some(_) => self.bucket(BucketKind::Static),
                        None => None,
                    };
                    let fallback = match (&self.config.offline_fallback, &static_bucket) {
                        (Some(path), Some(static_bucket)) => Some(OfflineFallback {
                            bucket: static_bucket,
                            key: Request::get(self.config.resolve(path)?).cache_key(),
                        }),
                        _ => None,
                    };
                    let network = self.network.as_ref();
                    match strategy {
                        Strategy::CacheFirst => {
                            cache_first(&request, &bucket, network, &self.stats, fallback.as_ref())
                                .await
                        }
                        Strategy::NetworkFirst => {
                            network_first(
                                &request,
                                &bucket,
                                network,
                                &self.stats,
                                fallback.as_ref(),
                            )
                            .await
                        }
                    }
                }
            },
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(response) => debug!(
                method = %request.method,
                url = %request.url,
                rule,
                route = %route,
                status = response.status,
                source = response.source.as_str(),
                elapsed_ms,
                "fetch handled"
            ),
            Err(e) => warn!(
                method = %request.method,
                url = %request.url,
                rule,
                route = %route,
                error = %e,
                elapsed_ms,
                "fetch failed"
            ),
        }

        result
    }

    /// Handle a message command, replying on `reply` when given
    pub async fn handle_message(
        &self,
        message: Message,
        reply: Option<oneshot::Sender<MessageReply>>,
    ) -> Result<()> {
        debug!(?message, "message received");

        let answer = match message {
            Message::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Release);
                MessageReply::Ack
            }
            Message::GetVersion => MessageReply::Version {
                version: self.names.static_name.clone(),
            },
            Message::CacheStaticResources => match self.cache_secondary().await {
                Ok(count) => {
                    info!(count, "static resources cached");
                    MessageReply::Cached { count }
                }
                Err(e) => {
                    error!(error = %e, "failed to cache static resources");
                    MessageReply::Error {
                        message: e.to_string(),
                    }
                }
            },
        };

        if let Some(reply) = reply {
            // The sender may have stopped listening
            let _ = reply.send(answer);
        }
        Ok(())
    }

    async fn cache_secondary(&self) -> Result<usize> {
        let bucket = self.storage.bucket(&self.names.static_name)?;
        let entries = self.fetch_all(&self.config.secondary_static).await?;
        bucket.put_all(&entries)?;
        for _ in &entries {
            self.stats.record_stored();
        }
        Ok(entries.len())
    }

    /// Show a notification for a push payload
    pub async fn handle_push(&self, payload: Option<&[u8]>) -> Result<()> {
        info!("push notification received");
        let notification = Notification::from_push(&self.config.notification, payload);
        self.host.show_notification(notification).await
    }

    /// Close the clicked notification and follow its action
    pub async fn handle_notification_click(&self, click: NotificationClick) -> Result<()> {
        info!(action = ?click.action, "notification clicked");
        self.host.close_notification(click.tag.as_deref()).await?;

        match click.outcome(&self.config.notification, &self.origin)? {
            ClickOutcome::Open(url) => self.host.open_window(&url).await,
            ClickOutcome::Dismiss => Ok(()),
        }
    }
}
