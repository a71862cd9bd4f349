//! Upstream network over reqwest

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use swcache::{Network, NetworkError, Request, Response};
use tracing::debug;
use url::Url;

/// Headers that describe a single hop and are not forwarded
const HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_header(name: &str) -> bool {
    HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Fetches same-origin URLs from the upstream site and everything else
/// from the open internet
pub struct UpstreamNetwork {
    client: reqwest::Client,
    origin: Url,
    upstream: Url,
}

impl UpstreamNetwork {
    pub fn new(origin: Url, upstream: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            origin,
            upstream,
        })
    }

    /// Where a worker URL is actually fetched from
    pub fn map_url(&self, url: &Url) -> Url {
        if url.origin() != self.origin.origin() {
            return url.clone();
        }

        let mut mapped = self.upstream.clone();
        let base = self.upstream.path().trim_end_matches('/');
        mapped.set_path(&format!("{}{}", base, url.path()));
        mapped.set_query(url.query());
        mapped
    }
}

fn classify(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_connect() {
        NetworkError::Unreachable(err.to_string())
    } else {
        NetworkError::Other(err.to_string())
    }
}

#[async_trait]
impl Network for UpstreamNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let target = self.map_url(&request.url);
        let method = reqwest::Method::from_str(request.method.as_str())
            .map_err(|e| NetworkError::Other(e.to_string()))?;

        let mut builder = self.client.request(method, target.clone());
        for (name, value) in &request.headers {
            if !is_hop_header(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let upstream = builder.send().await.map_err(classify)?;
        let status = upstream.status();
        let headers = upstream
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_header(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = upstream.bytes().await.map_err(classify)?;

        debug!(url = %target, status = status.as_u16(), bytes = body.len(), "upstream fetch");

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            source: swcache::ResponseSource::Network,
        })
    }
}
