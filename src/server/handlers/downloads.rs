//! Attachment downloads of the output files.

use std::path::Path;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use super::super::AppState;
use super::error;
use crate::repository::{csv_path, json_path, CSV_FILENAME, JSON_FILENAME};

pub async fn download_csv(State(state): State<AppState>) -> Response {
    let path = csv_path(&state.control.config().output_dir);
    serve_attachment(&path, CSV_FILENAME, "text/csv; charset=utf-8", "CSV").await
}

pub async fn download_json(State(state): State<AppState>) -> Response {
    let path = json_path(&state.control.config().output_dir);
    serve_attachment(&path, JSON_FILENAME, "application/json", "JSON").await
}

async fn serve_attachment(
    path: &Path,
    filename: &str,
    mime: &'static str,
    label: &str,
) -> Response {
    let content = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return error(StatusCode::NOT_FOUND, format!("No {} data yet", label));
        }
        Err(e) => {
            tracing::error!("Failed to read {}: {}", path.display(), e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
        }
    };

    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        content,
    )
        .into_response()
}
