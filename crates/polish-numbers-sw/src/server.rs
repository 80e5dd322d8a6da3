//! Local proxy: every HTTP request becomes a fetch event for the worker.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{info, warn};

use polish_numbers_core::{Request, ServiceWorker};

/// Headers describing the client connection rather than the resource. They
/// are not passed between the proxy's two connections.
const CONNECTION_HEADERS: [&str; 4] = ["host", "connection", "transfer-encoding", "upgrade"];

/// Headers describing a request body. Bodies are not forwarded, so neither
/// are these.
const BODY_HEADERS: [&str; 3] = ["content-length", "content-type", "content-encoding"];

fn is_connection_header(name: &str) -> bool {
    CONNECTION_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn is_body_header(name: &str) -> bool {
    BODY_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[derive(Clone)]
struct AppState {
    worker: Arc<ServiceWorker>,
}

pub fn router(worker: Arc<ServiceWorker>) -> Router {
    Router::new()
        .fallback(proxy)
        .with_state(AppState { worker })
}

pub async fn run_proxy(worker: Arc<ServiceWorker>, listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", listen))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(addr = %addr, "Offline cache proxy listening");
    axum::serve(listener, router(worker)).await?;
    Ok(())
}

fn to_request(method: &Method, uri: &Uri, headers: &HeaderMap) -> Request {
    let url = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    headers
        .iter()
        .filter(|(name, _)| {
            !is_connection_header(name.as_str()) && !is_body_header(name.as_str())
        })
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(Request::new(method.as_str(), url), |request, (name, value)| {
            request.with_header(name, value)
        })
}

fn into_http(response: polish_numbers_core::Response) -> Response {
    let mut builder = axum::http::Response::builder().status(response.status);
    for (name, value) in &response.headers {
        if !is_connection_header(name) {
            builder = builder.header(name, value);
        }
    }
    builder.body(Body::from(response.body)).unwrap_or_else(|e| {
        warn!(error = %e, "Unrepresentable response");
        StatusCode::BAD_GATEWAY.into_response()
    })
}

async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = to_request(&method, &uri, &headers);
    match state.worker.handle_fetch(request).await {
        Ok(served) => {
            info!(method = %method, uri = %uri, status = served.response.status, source = %served.source, "Served");
            into_http(served.response)
        }
        Err(e) => {
            warn!(method = %method, uri = %uri, error = %e, "Fetch failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
