//! Start, stop, login and status endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Response,
    Json,
};
use tracing::warn;

use super::super::AppState;
use super::{error, ok};
use crate::services::{RunStatus, StartRequest};

/// Start a run for the requested keyword.
pub async fn start(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            warn!("Rejected start request: {}", rejection);
            return error(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.control.start(request) {
        Ok(run) => ok(format!(
            "Scraping started for '{}' (target {})",
            run.keyword, run.target_count
        )),
        Err(e) => error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

pub async fn stop(State(state): State<AppState>) -> Response {
    match state.control.stop() {
        Ok(()) => ok("Stop requested"),
        Err(e) => error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// Kept for dashboard compatibility; cookies are applied when a run starts.
pub async fn login(State(state): State<AppState>) -> Response {
    state
        .control
        .events()
        .info("Login requested (no-op): cookies will be used when scraping starts");
    ok("Ready: cookies will be used when starting scraper.")
}

pub async fn status(State(state): State<AppState>) -> Json<RunStatus> {
    Json(state.control.status())
}
