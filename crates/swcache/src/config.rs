//! Worker configuration
//!
//! A `WorkerConfig` is fixed for the lifetime of a worker; a new version
//! means a new worker generation with its own pair of buckets.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use swstore::Bucket;
use url::Url;

use crate::error::{Result, WorkerError};

/// Names of the two buckets owned by one generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    /// Bucket seeded at install time
    pub static_name: String,
    /// Bucket filled lazily on misses
    pub dynamic_name: String,
}

impl CacheNames {
    /// Whether `name` belongs to this generation
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }
}

/// Notification settings for push events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notification title
    pub title: String,
    /// Body used when the push payload is empty
    pub default_body: String,
    /// Icon asset path
    pub icon: String,
    /// Badge asset path
    pub badge: String,
    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,
    /// Opened by the "explore" action
    pub explore_url: String,
    /// Opened when the notification body is clicked
    pub root_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Good Way Travels".to_string(),
            default_body: "New update from Good Way Travels".to_string(),
            icon: "/assets/Images/logo.webp".to_string(),
            badge: "/assets/Images/logo.webp".to_string(),
            vibrate: vec![100, 50, 100],
            explore_url: "/services.html".to_string(),
            root_url: "/".to_string(),
        }
    }
}

/// Immutable configuration of one worker generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Deployment version; part of every bucket name
    pub version: String,
    /// Origin the site is served from; relative paths resolve against it
    pub origin: String,
    /// Prefix of the static bucket name
    pub static_prefix: String,
    /// Prefix of the dynamic bucket name
    pub dynamic_prefix: String,
    /// Resources that must be cached for install to succeed
    pub precache: Vec<String>,
    /// Resources cached on request by `CACHE_STATIC_RESOURCES`
    pub secondary_static: Vec<String>,
    /// Document served to failed navigations; must be precached
    pub offline_fallback: Option<String>,
    /// Third-party asset hosts (fonts, icon CDNs)
    pub third_party_hosts: Vec<String>,
    /// Promote straight after a successful install
    pub skip_waiting_on_install: bool,
    /// Push notification settings
    pub notification: NotificationConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            origin: "http://127.0.0.1:8080".to_string(),
            static_prefix: "static".to_string(),
            dynamic_prefix: "dynamic".to_string(),
            precache: [
                "/",
                "/index.html",
                "/offline.html",
                "/css/critical.css",
                "/js/core.js",
                "/js/performance-optimizer.js",
                "/assets/Images/logo.webp",
                "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css",
                "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            secondary_static: [
                "/css/main.css",
                "/css/bootstrap-integration.css",
                "/css/about.css",
                "/css/contact.css",
                "/css/inquiry.css",
                "/css/services.css",
                "/js/main-optimized.js",
                "/js/about.js",
                "/js/contact.js",
                "/js/inquiry.js",
                "/js/services.js",
                "/about.html",
                "/contact.html",
                "/inquiry.html",
                "/services.html",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_fallback: Some("/offline.html".to_string()),
            third_party_hosts: [
                "cdn.jsdelivr.net",
                "cdnjs.cloudflare.com",
                "fonts.googleapis.com",
                "fonts.gstatic.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            skip_waiting_on_install: true,
            notification: NotificationConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| WorkerError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: WorkerConfig = serde_json::from_str(&raw)
            .map_err(|e| WorkerError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the config describes a usable generation
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(WorkerError::Config("version must not be empty".to_string()));
        }

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(WorkerError::Config(format!(
                "origin must be http or https, got {}",
                origin.scheme()
            )));
        }

        let names = self.cache_names();
        for name in [&names.static_name, &names.dynamic_name] {
            Bucket::validate_name(name)
                .map_err(|e| WorkerError::Config(e.to_string()))?;
        }
        if names.static_name == names.dynamic_name {
            return Err(WorkerError::Config(
                "static and dynamic bucket names must differ".to_string(),
            ));
        }

        for entry in self.precache.iter().chain(&self.secondary_static) {
            self.resolve(entry)?;
        }

        if let Some(fallback) = &self.offline_fallback {
            let fallback = self.resolve(fallback)?;
            let precached = self
                .precache
                .iter()
                .filter_map(|p| self.resolve(p).ok())
                .any(|url| url == fallback);
            if !precached {
                return Err(WorkerError::Config(format!(
                    "offline fallback {} is not in the precache list",
                    fallback
                )));
            }
        }

        Ok(())
    }

    /// Parsed origin
    pub fn origin_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.origin)?)
    }

    /// Resolve a path (or absolute URL) against the origin
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.origin_url()?.join(path)?)
    }

    /// Bucket names for this version
    pub fn cache_names(&self) -> CacheNames {
        CacheNames {
            static_name: format!("{}-v{}", self.static_prefix, self.version),
            dynamic_name: format!("{}-v{}", self.dynamic_prefix, self.version),
        }
    }
}
