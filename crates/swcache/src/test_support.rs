//! Scripted network and recording host for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use swstore::CacheStorage;
use tempfile::TempDir;
use tokio::sync::Notify;
use url::Url;

use crate::config::WorkerConfig;
use crate::error::{NetworkError, Result};
use crate::fetch::{Request, Response};
use crate::host::WorkerHost;
use crate::network::Network;
use crate::notification::Notification;
use crate::worker::CacheWorker;

#[derive(Clone)]
enum Reply {
    Respond(u16, Vec<u8>),
    Fail,
}

/// Network that answers from a table keyed by absolute URL
#[derive(Default)]
pub(crate) struct MockNetwork {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.replies
            .lock()
            .insert(url.to_string(), Reply::Respond(status, body.as_bytes().to_vec()));
    }

    pub fn fail(&self, url: &str) {
        self.replies.lock().insert(url.to_string(), Reply::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetworkError> {
        let url = request.url.to_string();
        self.calls.lock().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable("offline".to_string()));
        }

        match self.replies.lock().get(&url).cloned() {
            Some(Reply::Respond(status, body)) => Ok(Response::new(status, body)),
            Some(Reply::Fail) => Err(NetworkError::Unreachable(url)),
            None => Err(NetworkError::Other(format!("no scripted reply for {}", url))),
        }
    }
}

/// Side effect observed by [`RecordingHost`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HostEvent {
    Claimed(String),
    Shown(Notification),
    Closed(Option<String>),
    Opened(String),
}

/// Host that records every side effect
#[derive(Default)]
pub(crate) struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
    hold: Mutex<Option<Arc<Notify>>>,
    claiming: Notify,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    /// Make `claim_clients` wait until the returned gate is notified
    pub fn hold_claims(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock() = Some(gate.clone());
        gate
    }

    /// Resolves once a held `claim_clients` call is waiting on its gate
    pub async fn claim_started(&self) {
        self.claiming.notified().await;
    }
}

#[async_trait]
impl WorkerHost for RecordingHost {
    async fn claim_clients(&self, version: &str) -> Result<()> {
        self.events.lock().push(HostEvent::Claimed(version.to_string()));
        let gate = self.hold.lock().clone();
        if let Some(gate) = gate {
            self.claiming.notify_one();
            gate.notified().await;
        }
        Ok(())
    }

    async fn show_notification(&self, notification: Notification) -> Result<()> {
        self.events.lock().push(HostEvent::Shown(notification));
        Ok(())
    }

    async fn close_notification(&self, tag: Option<&str>) -> Result<()> {
        self.events
            .lock()
            .push(HostEvent::Closed(tag.map(str::to_string)));
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<()> {
        self.events.lock().push(HostEvent::Opened(url.to_string()));
        Ok(())
    }
}

pub(crate) const ORIGIN: &str = "http://localhost:8080";

/// Absolute URL on the test origin
pub(crate) fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

/// Small config on the test origin
pub(crate) fn config(version: &str, precache: &[&str]) -> WorkerConfig {
    WorkerConfig {
        version: version.to_string(),
        origin: ORIGIN.to_string(),
        precache: precache.iter().map(|p| p.to_string()).collect(),
        secondary_static: vec!["/about.html".to_string(), "/css/about.css".to_string()],
        offline_fallback: None,
        ..WorkerConfig::default()
    }
}

/// Storage in a fresh temp dir plus the mocks
pub(crate) struct Fixture {
    _dir: TempDir,
    pub storage: Arc<CacheStorage>,
    pub network: Arc<MockNetwork>,
    pub host: Arc<RecordingHost>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(CacheStorage::open(dir.path()).unwrap());
        Self {
            _dir: dir,
            storage,
            network: MockNetwork::new(),
            host: RecordingHost::new(),
        }
    }

    pub fn worker(&self, config: WorkerConfig) -> Arc<CacheWorker> {
        Arc::new(
            CacheWorker::new(
                config,
                Arc::clone(&self.storage),
                self.network.clone(),
                self.host.clone(),
            )
            .unwrap(),
        )
    }
}
