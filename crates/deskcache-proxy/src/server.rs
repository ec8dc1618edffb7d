//! HTTP server in front of the interception proxy
//!
//! Every request except the health endpoint is handed to
//! `InterceptionProxy::handle`.

use std::sync::Arc;

use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use deskcache_core::api::UNREACHABLE_HEADER;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ProxyError;
use crate::types::{HealthResponse, ProxyRequest, ProxyResponse};
use crate::upstream::is_hop_by_hop;
use crate::worker::InterceptionProxy;

pub const HEALTH_PATH: &str = "/__deskcache/health";

/// Largest request body forwarded upstream
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state for the HTTP server
pub struct ServerState {
    pub proxy: InterceptionProxy,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(proxy: InterceptionProxy) -> Self {
        Self {
            proxy,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting proxy server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down proxy server");
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.proxy.version().to_string(),
        uptime_secs,
    })
}

async fn intercept(State(state): State<SharedState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
    };
    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = match state.proxy.resolve(path_and_query) {
        Ok(url) => url,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let request = ProxyRequest {
        method: parts.method,
        url,
        headers,
        body: body.to_vec(),
    };

    match state.proxy.handle(&request).await {
        Ok(response) => to_response(response),
        Err(e) => {
            warn!(method = %request.method, url = %request.url, error = %e, "Proxy request failed");
            proxy_error_response(e)
        }
    }
}

fn to_response(proxied: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(proxied.response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in proxied.response.headers.iter().filter(|(name, _)| !is_hop_by_hop(name)) {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            headers.append(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static("x-cache"),
        HeaderValue::from_static(proxied.cache.as_header()),
    );

    (status, headers, proxied.response.body).into_response()
}

/// Upstream unreachability becomes a 502 carrying the marker header that
/// deskcache clients read as a transport failure.
fn proxy_error_response(err: ProxyError) -> Response {
    match err {
        ProxyError::Unreachable(_) => (
            StatusCode::BAD_GATEWAY,
            [(UNREACHABLE_HEADER, "1")],
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
        ProxyError::InvalidRequest(_) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        ProxyError::Storage(_) | ProxyError::Install { .. } => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
