//! HTTP surface: worker control endpoints plus the intercepting fallback

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::State;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use swcache::{
    CacheWorker, Destination, Message, MessageReply, Method, Network, NotificationClick,
    Registration, Request, Response, StatsSnapshot, WorkerConfig, WorkerError,
};
use swstore::CacheStorage;
use tracing::{info, warn};
use url::Url;

use crate::host::{DaemonHost, HostEvent};
use crate::network::is_hop_header;

/// Largest request body forwarded to the worker
const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

const SOURCE_HEADER: HeaderName = HeaderName::from_static("x-sw-source");

/// Shared daemon state
pub struct AppState {
    pub registration: Registration,
    pub storage: Arc<CacheStorage>,
    pub network: Arc<dyn Network>,
    pub host: Arc<DaemonHost>,
    /// Worker config file; built-in defaults when absent
    pub config_path: Option<PathBuf>,
    /// Origin every request is interpreted against, fixed at startup
    pub origin: Url,
}

impl AppState {
    pub fn new(
        storage: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<DaemonHost>,
        config_path: Option<PathBuf>,
        origin: Url,
    ) -> Self {
        Self {
            registration: Registration::new(Arc::clone(&network)),
            storage,
            network,
            host,
            config_path,
            origin,
        }
    }

    pub fn load_config(&self) -> swcache::Result<WorkerConfig> {
        match &self.config_path {
            Some(path) => WorkerConfig::load(path),
            None => Ok(WorkerConfig::default()),
        }
    }

    /// Read the config and register a new worker generation, returning it
    pub async fn install_generation(&self) -> swcache::Result<Arc<CacheWorker>> {
        let config = self.load_config()?;
        if config.origin_url()? != self.origin {
            return Err(WorkerError::Config(format!(
                "origin changed from {} to {}; restart to apply",
                self.origin, config.origin
            )));
        }

        let worker = Arc::new(CacheWorker::new(
            config,
            Arc::clone(&self.storage),
            Arc::clone(&self.network),
            self.host.clone(),
        )?);
        self.registration.register(Arc::clone(&worker)).await?;
        Ok(worker)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/__worker/message", post(post_message))
        .route("/__worker/push", post(push))
        .route("/__worker/notificationclick", post(notification_click))
        .route("/__worker/update", post(update))
        .route("/__worker/stats", get(stats))
        .fallback(fetch)
        .with_state(state)
}

/// Worker error rendered as a JSON control-endpoint reply
pub struct ApiError(WorkerError);

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> HttpResponse {
        let status = match &self.0 {
            WorkerError::NoWorker | WorkerError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            WorkerError::InstallFailed { .. } | WorkerError::InvalidState { .. } => {
                StatusCode::CONFLICT
            }
            WorkerError::Config(_) | WorkerError::Url(_) => StatusCode::BAD_REQUEST,
            WorkerError::Store(_) | WorkerError::Host(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = status.as_u16(), error = %self.0, "control request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Message>,
) -> Result<Json<MessageReply>, ApiError> {
    Ok(Json(state.registration.post_message(message).await?))
}

async fn push(State(state): State<Arc<AppState>>, body: Bytes) -> Result<StatusCode, ApiError> {
    let payload = (!body.is_empty()).then_some(body.as_ref());
    state.registration.push(payload).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn notification_click(
    State(state): State<Arc<AppState>>,
    Json(click): Json<NotificationClick>,
) -> Result<StatusCode, ApiError> {
    state.registration.notification_click(click).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Serialize)]
struct UpdateReply {
    version: String,
    state: String,
    active_version: Option<String>,
}

async fn update(State(state): State<Arc<AppState>>) -> Result<Json<UpdateReply>, ApiError> {
    let worker = state.install_generation().await?;
    info!(version = worker.version(), state = %worker.state(), "update applied");
    Ok(Json(UpdateReply {
        version: worker.version().to_string(),
        state: worker.state().to_string(),
        active_version: state.registration.active_version(),
    }))
}

#[derive(Serialize)]
struct StatsReply {
    active_version: Option<String>,
    waiting_version: Option<String>,
    stats: Option<StatsSnapshot>,
    buckets: Vec<String>,
    events: Vec<HostEvent>,
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsReply> {
    let active = state.registration.active();
    Json(StatsReply {
        active_version: active.as_ref().map(|w| w.version().to_string()),
        waiting_version: state
            .registration
            .waiting()
            .map(|w| w.version().to_string()),
        stats: active.map(|w| w.stats().snapshot()),
        buckets: state.storage.keys(),
        events: state.host.recent(),
    })
}

/// Translate an incoming HTTP request into a worker request on `origin`
async fn to_worker_request(
    origin: &Url,
    request: axum::extract::Request,
) -> Result<Request, HttpResponse> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE.into_response())?;

    let mut url = origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let method = parts
        .method
        .as_str()
        .parse::<Method>()
        .unwrap_or_else(|never| match never {});

    let header_str = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
    let destination = if header_str("sec-fetch-mode") == Some("navigate") {
        Destination::Document
    } else {
        header_str("sec-fetch-dest")
            .map(Destination::from_fetch_dest)
            .unwrap_or_default()
    };

    let mut worker_request = Request::new(method, url)
        .with_destination(destination)
        .with_body(body);
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            worker_request = worker_request.with_header(name.as_str(), value);
        }
    }
    Ok(worker_request)
}

fn into_http(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut http = (status, Body::from(response.body)).into_response();

    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        if is_hop_header(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(
        SOURCE_HEADER,
        HeaderValue::from_static(response.source.as_str()),
    );
    http
}

fn offline() -> HttpResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, "text/plain")],
        "Offline",
    )
        .into_response()
}

async fn fetch(State(state): State<Arc<AppState>>, request: axum::extract::Request) -> HttpResponse {
    let request = match to_worker_request(&state.origin, request).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (method, url) = (request.method.clone(), request.url.clone());
    match state.registration.handle_fetch(request).await {
        Ok(response) => into_http(response),
        Err(e) => {
            warn!(%method, %url, error = %e, "fetch failed, answering offline");
            offline()
        }
    }
}
