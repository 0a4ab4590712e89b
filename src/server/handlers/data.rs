//! Collected posts of the current run.

use axum::{extract::State, Json};
use serde::Serialize;

use super::super::AppState;
use crate::models::Post;

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub count: usize,
    pub tweets: Vec<Post>,
}

pub async fn data(State(state): State<AppState>) -> Json<DataResponse> {
    let tweets = state.control.posts();
    Json(DataResponse {
        count: tweets.len(),
        tweets,
    })
}
