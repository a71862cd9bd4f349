//! Push notifications and click handling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::NotificationConfig;
use crate::error::Result;

/// Action id that opens the services page
pub const ACTION_EXPLORE: &str = "explore";

/// Action id that only dismisses
pub const ACTION_CLOSE: &str = "close";

/// Button shown on a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Id reported back on click
    pub action: String,
    /// Button label
    pub title: String,
    /// Button icon path
    pub icon: String,
}

/// Notification built from a push event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Title
    pub title: String,
    /// Body text
    pub body: String,
    /// Icon path
    pub icon: String,
    /// Badge path
    pub badge: String,
    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,
    /// When the push arrived
    pub arrived_at: DateTime<Utc>,
    /// Offered actions
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build the notification for a push payload
    ///
    /// The payload is plain text; an empty or missing payload uses the
    /// configured default body.
    pub fn from_push(config: &NotificationConfig, payload: Option<&[u8]>) -> Self {
        let body = payload
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| config.default_body.clone());

        Self {
            title: config.title.clone(),
            body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            arrived_at: Utc::now(),
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: "View Services".to_string(),
                    icon: config.icon.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Close".to_string(),
                    icon: config.icon.clone(),
                },
            ],
        }
    }
}

/// A click on a shown notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationClick {
    /// Action button id, `None` for a click on the body
    pub action: Option<String>,
    /// Tag of the clicked notification
    pub tag: Option<String>,
}

/// What a click should do after the notification is closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Nothing more
    Dismiss,
    /// Open a window on the URL
    Open(Url),
}

impl NotificationClick {
    /// Decide the follow-up for this click
    pub fn outcome(&self, config: &NotificationConfig, origin: &Url) -> Result<ClickOutcome> {
        match self.action.as_deref() {
            Some(ACTION_EXPLORE) => Ok(ClickOutcome::Open(origin.join(&config.explore_url)?)),
            Some(ACTION_CLOSE) => Ok(ClickOutcome::Dismiss),
            None | Some("") => Ok(ClickOutcome::Open(origin.join(&config.root_url)?)),
            Some(_) => Ok(ClickOutcome::Dismiss),
        }
    }
}
