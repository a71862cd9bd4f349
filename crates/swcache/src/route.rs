//! Request classification
//!
//! An ordered list of `(predicate, route)` rules evaluated top to bottom.
//! The first matching rule wins; a request no rule matches takes the
//! table's fallback route.

use std::fmt;

use crate::fetch::{Method, Request};

/// Caching strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve from the bucket when present, network on miss
    CacheFirst,
    /// Network first, bucket only when the network fails
    NetworkFirst,
}

/// Which of the generation's buckets a route uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// Seeded at install
    Static,
    /// Filled on demand
    Dynamic,
}

/// Outcome of classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Straight to the network, never cached
    Bypass,
    /// Run `strategy` against `bucket`
    Cache {
        /// Strategy to run
        strategy: Strategy,
        /// Bucket to read and fill
        bucket: BucketKind,
    },
}

impl Route {
    /// Shorthand for a caching route
    pub const fn cache(strategy: Strategy, bucket: BucketKind) -> Self {
        Route::Cache { strategy, bucket }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Bypass => f.write_str("bypass"),
            Route::Cache { strategy, bucket } => {
                let strategy = match strategy {
                    Strategy::CacheFirst => "cache-first",
                    Strategy::NetworkFirst => "network-first",
                };
                let bucket = match bucket {
                    BucketKind::Static => "static",
                    BucketKind::Dynamic => "dynamic",
                };
                write!(f, "{}/{}", strategy, bucket)
            }
        }
    }
}

type Predicate = Box<dyn Fn(&Request) -> bool + Send + Sync>;

struct Rule {
    name: &'static str,
    predicate: Predicate,
    route: Route,
}

/// Ordered classification rules with a catch-all
pub struct RouteTable {
    rules: Vec<Rule>,
    fallback: Route,
}

const HTML_EXTENSIONS: &[&str] = &["html", "htm"];
const ASSET_EXTENSIONS: &[&str] = &["css", "js", "mjs"];
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif", "bmp",
];

/// Lower-cased extension of the last path segment
fn path_extension(request: &Request) -> Option<String> {
    let segment = request.url.path().rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

fn has_extension(request: &Request, extensions: &[&str]) -> bool {
    path_extension(request).is_some_and(|ext| extensions.contains(&ext.as_str()))
}

impl RouteTable {
    /// Empty table that sends everything to `fallback`
    pub fn new(fallback: Route) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// The site's policy: bypass non-GET and non-HTTP, cache-first for
    /// pages, stylesheets, scripts and images, network-first for the rest
    pub fn standard(third_party_hosts: &[String]) -> Self {
        let hosts: Vec<String> = third_party_hosts
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();

        Self::new(Route::cache(Strategy::NetworkFirst, BucketKind::Dynamic))
            .rule(
                "non-get",
                |req| req.method != Method::Get,
                Route::Bypass,
            )
            .rule(
                "non-http",
                |req| !matches!(req.url.scheme(), "http" | "https"),
                Route::Bypass,
            )
            .rule(
                "document",
                |req| req.url.path() == "/" || has_extension(req, HTML_EXTENSIONS),
                Route::cache(Strategy::CacheFirst, BucketKind::Static),
            )
            .rule(
                "asset",
                |req| has_extension(req, ASSET_EXTENSIONS),
                Route::cache(Strategy::CacheFirst, BucketKind::Static),
            )
            .rule(
                "image",
                |req| has_extension(req, IMAGE_EXTENSIONS),
                Route::cache(Strategy::CacheFirst, BucketKind::Dynamic),
            )
            .rule(
                "third-party",
                move |req| {
                    req.url
                        .host_str()
                        .is_some_and(|host| hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
                },
                Route::cache(Strategy::NetworkFirst, BucketKind::Dynamic),
            )
    }

    /// Append a rule after the existing ones
    pub fn rule<F>(mut self, name: &'static str, predicate: F, route: Route) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            name,
            predicate: Box::new(predicate),
            route,
        });
        self
    }

    /// Classify a request, returning the matched rule name and its route
    pub fn classify(&self, request: &Request) -> (&'static str, Route) {
        self.rules
            .iter()
            .find(|rule| (rule.predicate)(request))
            .map(|rule| (rule.name, rule.route))
            .unwrap_or(("default", self.fallback))
    }

    /// Whether the request is an image by URL, used to pick the
    /// synthetic 404 when nothing else is available
    pub fn is_image(request: &Request) -> bool {
        has_extension(request, IMAGE_EXTENSIONS)
    }
}
