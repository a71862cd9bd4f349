//! Registration: the active and waiting worker slots
//!
//! A newly registered worker installs, then waits until there is no active
//! worker or it has asked to skip waiting. Promotion activates the new
//! worker before swapping it in, so a failed install or activation leaves
//! the previous generation serving.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use crate::error::{Result, WorkerError};
use crate::fetch::{Request, Response, ResponseSource};
use crate::message::{Message, MessageReply};
use crate::network::Network;
use crate::notification::NotificationClick;
use crate::worker::CacheWorker;

/// Holds the active worker and at most one waiting worker
pub struct Registration {
    network: Arc<dyn Network>,
    active: RwLock<Option<Arc<CacheWorker>>>,
    waiting: RwLock<Option<Arc<CacheWorker>>>,
    lifecycle: Mutex<()>,
}

impl Registration {
    /// Empty registration; fetches pass straight to `network` until a
    /// worker is active
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Currently active worker
    pub fn active(&self) -> Option<Arc<CacheWorker>> {
        self.active.read().clone()
    }

    /// Installed worker waiting to take over
    pub fn waiting(&self) -> Option<Arc<CacheWorker>> {
        self.waiting.read().clone()
    }

    /// Version of the active worker
    pub fn active_version(&self) -> Option<String> {
        self.active().map(|w| w.version().to_string())
    }

    /// Install `worker` and promote it if nothing blocks it
    ///
    /// On install failure the worker is discarded and the error returned;
    /// the active worker and its buckets are untouched.
    pub async fn register(&self, worker: Arc<CacheWorker>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        worker.install().await?;

        let replaced = self.waiting.write().replace(worker);
        if let Some(old) = replaced {
            old.mark_redundant();
        }

        self.promote_locked().await
    }

    /// Promote the waiting worker if it is allowed to take over
    pub async fn promote(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.promote_locked().await
    }

    async fn promote_locked(&self) -> Result<()> {
        let Some(next) = self.waiting() else {
            return Ok(());
        };

        let has_active = self.active.read().is_some();
        if has_active && !next.skip_waiting_requested() {
            info!(version = next.version(), "worker installed, waiting for clients to release");
            return Ok(());
        }

        self.waiting.write().take();
        if let Err(e) = next.activate().await {
            warn!(version = next.version(), error = %e, "activation failed");
            next.mark_redundant();
            return Err(e);
        }

        let previous = self.active.write().replace(Arc::clone(&next));
        if let Some(previous) = previous {
            previous.mark_redundant();
        }
        info!(version = next.version(), "worker promoted");
        Ok(())
    }

    /// Route a fetch through the active worker, or straight to the network
    /// when there is none
    pub async fn handle_fetch(&self, request: Request) -> Result<Response> {
        match self.active() {
            Some(worker) => worker.handle_fetch(request).await,
            None => {
                let mut response = self.network.fetch(&request).await?;
                response.source = ResponseSource::Bypass;
                Ok(response)
            }
        }
    }

    /// Deliver a page message, preferring the waiting worker
    pub async fn post_message(&self, message: Message) -> Result<MessageReply> {
        let target = self
            .waiting()
            .or_else(|| self.active())
            .ok_or(WorkerError::NoWorker)?;

        let skip_waiting = message == Message::SkipWaiting;
        let (tx, rx) = oneshot::channel();
        target.handle_message(message, Some(tx)).await?;
        let reply = rx.await.map_err(|_| WorkerError::NoWorker)?;

        if skip_waiting {
            self.promote().await?;
        }
        Ok(reply)
    }

    /// Deliver a push event to the active worker
    pub async fn push(&self, payload: Option<&[u8]>) -> Result<()> {
        let worker = self.active().ok_or(WorkerError::NoWorker)?;
        worker.handle_push(payload).await
    }

    /// Deliver a notification click to the active worker
    pub async fn notification_click(&self, click: NotificationClick) -> Result<()> {
        let worker = self.active().ok_or(WorkerError::NoWorker)?;
        worker.handle_notification_click(click).await
    }
}
