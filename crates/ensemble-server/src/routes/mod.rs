pub mod chat;
pub mod health;
pub mod meta;

use axum::Router;

use crate::state::AppState;

/// All application routes, without middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(meta::router())
        .merge(chat::router())
}
