//! Side effects performed by the environment hosting a worker

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::notification::Notification;

/// The environment that delivers events to a worker and carries out the
/// effects it cannot perform itself
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Route all open clients through the worker running `version`
    async fn claim_clients(&self, version: &str) -> Result<()>;

    /// Display a notification
    async fn show_notification(&self, notification: Notification) -> Result<()>;

    /// Close the clicked notification
    async fn close_notification(&self, tag: Option<&str>) -> Result<()>;

    /// Open a window on `url`
    async fn open_window(&self, url: &Url) -> Result<()>;
}
