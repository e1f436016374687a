use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::metrics::encode_metrics;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub feed: String,
    pub connected: bool,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub feed_name: String,
    pub connected: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new(feed_name: impl Into<String>, connected: Arc<AtomicBool>) -> Self {
        Self {
            feed_name: feed_name.into(),
            connected,
        }
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        feed: state.feed_name.clone(),
        connected: state.connected.load(Ordering::SeqCst),
    })
}

/// Ready endpoint - returns 200 only while the session is open
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = state.connected.load(Ordering::SeqCst);
    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if connected { "ready" } else { "not_ready" }.to_string(),
            feed: state.feed_name.clone(),
            connected,
        }),
    )
}

/// Prometheus text exposition
async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                e.to_string(),
            )
        }
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server until `shutdown` flips to true
pub async fn run_server(
    addr: SocketAddr,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Health server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}
