//! Local cache-first HTTP proxy.
//!
//! Every request that does not hit `/__precache/health` is handed to the
//! worker's fetch handler. A network failure on a miss becomes `502`.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request as HttpRequest, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::request::{Request, Response};
use crate::worker::ServiceWorker;

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/__precache/health";

/// Largest request body accepted from clients.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
struct ProxyState {
    worker: Arc<dyn ServiceWorker>,
    cache_name: Arc<str>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    cache: String,
}

async fn health(State(state): State<ProxyState>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        cache: state.cache_name.to_string(),
    })
}

async fn intercept(State(state): State<ProxyState>, req: HttpRequest) -> HttpResponse {
    let (parts, body) = req.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("unreadable request body: {e}")).into_response();
        }
    };

    let request = Request {
        method: parts.method.as_str().to_string(),
        path: parts
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .to_string(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body,
    };

    let path = request.path.clone();
    match state.worker.on_fetch(request).await {
        Ok(response) => into_http(response),
        Err(e) => {
            log::warn!("Fetch of {path} failed: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

fn into_http(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = HttpResponse::new(Body::from(response.body));
    *out.status_mut() = status;
    for (name, value) in response.headers {
        // Recomputed from the body by the server.
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            out.headers_mut().append(name, value);
        }
    }
    out
}

/// Builds the proxy router around `worker`.
pub fn router(worker: Arc<dyn ServiceWorker>, cache_name: &str) -> Router {
    let state = ProxyState {
        worker,
        cache_name: Arc::from(cache_name),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(intercept)
        .layer(cors)
        .with_state(state)
}

/// Serves `router` on an already bound listener until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve_on(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Binds to the configured address and serves until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server cannot bind to the address.
pub async fn serve(
    worker: Arc<dyn ServiceWorker>,
    cache_name: &str,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    log::info!("Serving cache {cache_name} on http://{}", listener.local_addr()?);
    serve_on(listener, router(worker, cache_name), shutdown).await
}
