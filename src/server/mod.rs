//! HTTP control surface: start/stop/status, collected data, downloads and a
//! live event stream.

mod handlers;

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::services::ControlPlane;

/// Default idle interval before the stream sends a heartbeat.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(500);

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub control: ControlPlane,
    /// Idle interval before the event stream sends a heartbeat comment.
    pub heartbeat: Duration,
}

impl AppState {
    pub fn new(control: ControlPlane) -> Self {
        Self {
            control,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(handlers::control::start))
        .route("/stop", post(handlers::control::stop))
        .route("/login", post(handlers::control::login))
        .route("/status", get(handlers::control::status))
        .route("/data", get(handlers::data::data))
        .route("/stream", get(handlers::stream::stream_events))
        .route("/download/csv", get(handlers::downloads::download_csv))
        .route("/download/json", get(handlers::downloads::download_json))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the control surface on `listener` until the server fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Control surface listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).await
}
