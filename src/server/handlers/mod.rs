//! Route handlers.

pub mod control;
pub mod data;
pub mod downloads;
pub mod stream;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// `{status, message}` body used by the control endpoints.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

pub fn ok(message: impl Into<String>) -> Response {
    Json(StatusMessage {
        status: "ok",
        message: message.into(),
    })
    .into_response()
}

pub fn error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(StatusMessage {
            status: "error",
            message: message.into(),
        }),
    )
        .into_response()
}
