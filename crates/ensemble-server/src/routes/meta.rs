use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde_json::Value;

use crate::state::AppState;

/// GET /meta -- every scene and character, keyed by id.
async fn get_meta(State(state): State<AppState>) -> Json<Value> {
    Json(state.catalog.to_meta())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/meta", get(get_meta))
}
