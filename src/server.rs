//! Offline-capable HTTP front for a worker host.
//!
//! Every request path is mapped onto the configured origin and handed to the
//! host as a fetch event, so a browser pointed at this server sees the app
//! exactly as the cache lifecycle would serve it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::error::{Error, Result};
use crate::event::{Message, ResponseSource};
use crate::host::WorkerHost;
use crate::network::Network;
use crate::request::{Request, Response};
use crate::store::CacheStorage;

/// Path prefix reserved for control endpoints.
pub const CONTROL_PREFIX: &str = "/__shellcache";

/// Response header naming where a response came from.
pub const SOURCE_HEADER: &str = "x-shellcache-source";

/// Headers describing the upstream connection rather than the resource.
const HOP_HEADERS: &[&str] = &["connection", "content-length", "transfer-encoding", "keep-alive"];

#[derive(Serialize)]
struct MessageResponse {
    message: String,
    accepted: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    state: String,
    origin: String,
    resources: usize,
    missing: usize,
}

fn into_http(response: Response, source: ResponseSource) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = Body::from(response.body).into_response();
    *out.status_mut() = status;

    let headers = out.headers_mut();
    for (name, value) in &response.headers {
        if HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&source.to_string()) {
        headers.insert(SOURCE_HEADER, value);
    }
    out
}

async fn handle_request<S, N>(
    State(host): State<Arc<WorkerHost<S, N>>>,
    method: Method,
    uri: Uri,
) -> axum::response::Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    // Request bodies are not forwarded.
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::NOT_IMPLEMENTED, format!("{method} is not supported")).into_response();
    }

    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("{}{path}", host.lifecycle().config().origin);
    let request = Request::new(method, url);

    match host.fetch(&request).await {
        Ok((response, source)) => {
            log::debug!("{} {} -> {} ({source})", request.method, request.url, response.status);
            into_http(response, source)
        }
        Err(e) => {
            log::warn!("Failed to serve {}: {e}", request.url);
            let status = if e.is_network() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, e.to_string()).into_response()
        }
    }
}

async fn post_message<S, N>(
    State(host): State<Arc<WorkerHost<S, N>>>,
    body: String,
) -> axum::response::Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let message = body.trim().to_string();
    let accepted = message.parse::<Message>().is_ok();
    match host.post_message(&message).await {
        Ok(_) => {
            let status = if accepted {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            };
            (status, axum::Json(MessageResponse { message, accepted })).into_response()
        }
        Err(e) => (StatusCode::CONFLICT, e.to_string()).into_response(),
    }
}

async fn status<S, N>(State(host): State<Arc<WorkerHost<S, N>>>) -> axum::response::Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let lifecycle = host.lifecycle();
    match lifecycle.missing_resources().await {
        Ok(missing) => axum::Json(StatusResponse {
            state: host.state().to_string(),
            origin: lifecycle.config().origin.clone(),
            resources: lifecycle.manifest().resources.len(),
            missing: missing.len(),
        })
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Builds the router for a worker host.
pub fn router<S, N>(host: Arc<WorkerHost<S, N>>) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    Router::new()
        .route(&format!("{CONTROL_PREFIX}/message"), post(post_message::<S, N>))
        .route(&format!("{CONTROL_PREFIX}/status"), get(status::<S, N>))
        .fallback(handle_request::<S, N>)
        .with_state(host)
}

/// Serves the host on an already bound listener until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve<S, N>(host: Arc<WorkerHost<S, N>>, listener: TcpListener) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let app = router(Arc::clone(&host));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {e}");
            }
        })
        .await?;
    host.shutdown();
    log::info!("Server stopped");
    Ok(())
}

/// Binds to `host:port` and serves the worker host.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server<S, N>(worker: Arc<WorkerHost<S, N>>, host: &str, port: u16) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| Error::Io(std::io::Error::other(format!("invalid bind address: {e}"))))?;
    let listener = TcpListener::bind(addr).await?;
    log::info!(
        "Serving {} on http://{}",
        worker.lifecycle().config().origin,
        listener.local_addr()?
    );
    serve(worker, listener).await
}
