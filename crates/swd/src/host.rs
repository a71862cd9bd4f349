//! Headless host: worker side effects become log lines and a short history
//! exposed through the stats endpoint

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use swcache::{Notification, WorkerHost};
use tracing::info;
use url::Url;

const HISTORY: usize = 32;

/// A side effect performed on behalf of a worker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEvent {
    ClientsClaimed { version: String },
    NotificationShown { notification: Notification },
    NotificationClosed { tag: Option<String> },
    WindowOpened { url: String },
}

#[derive(Default)]
pub struct DaemonHost {
    events: Mutex<VecDeque<HostEvent>>,
}

impl DaemonHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent events, oldest first
    pub fn recent(&self) -> Vec<HostEvent> {
        self.events.lock().iter().cloned().collect()
    }

    fn record(&self, event: HostEvent) {
        let mut events = self.events.lock();
        if events.len() == HISTORY {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[async_trait]
impl WorkerHost for DaemonHost {
    async fn claim_clients(&self, version: &str) -> swcache::Result<()> {
        info!(version, "clients claimed");
        self.record(HostEvent::ClientsClaimed {
            version: version.to_string(),
        });
        Ok(())
    }

    async fn show_notification(&self, notification: Notification) -> swcache::Result<()> {
        info!(title = %notification.title, body = %notification.body, "notification shown");
        self.record(HostEvent::NotificationShown { notification });
        Ok(())
    }

    async fn close_notification(&self, tag: Option<&str>) -> swcache::Result<()> {
        info!(?tag, "notification closed");
        self.record(HostEvent::NotificationClosed {
            tag: tag.map(str::to_string),
        });
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> swcache::Result<()> {
        info!(%url, "window opened");
        self.record(HostEvent::WindowOpened {
            url: url.to_string(),
        });
        Ok(())
    }
}
