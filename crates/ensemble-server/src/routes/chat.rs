// POST /chat -- stream one character's next line.
//
// The body is the raw concatenation of fragments, written as they arrive.
// Failures (unknown scene/character, upstream rejection, broken upstream
// stream) are written into the same body as bracketed marker text; once
// streaming has started the status is always 200.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ensemble_core::{compose_prompt, TurnRequest};
use ensemble_llm::Fragment;
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::state::AppState;

const EVENT_STREAM: &str = "text/event-stream";

async fn chat(State(state): State<AppState>, Json(turn): Json<TurnRequest>) -> Response {
    info!(
        scene = %turn.scenario_id,
        speaker = %turn.next_agent_id,
        participants = ?turn.participants,
        history_len = turn.history.len(),
        "turn requested"
    );

    let prompt = compose_prompt(
        &state.catalog,
        &turn.scenario_id,
        &turn.next_agent_id,
        &turn.participants,
        &turn.history,
    );

    let body = match prompt {
        Ok(prompt) => {
            let fragments = state.relay.relay(prompt).map(|fragment| {
                if let Fragment::Error(err) = &fragment {
                    warn!(error = %err, "turn ended with upstream error");
                }
                Ok::<_, Infallible>(fragment.into_text())
            });
            Body::from_stream(fragments)
        }
        Err(err) => {
            warn!(
                scene = %turn.scenario_id,
                speaker = %turn.next_agent_id,
                "unknown scene or speaker; upstream not called"
            );
            Body::from(err.to_string())
        }
    };

    (
        [
            (header::CONTENT_TYPE, EVENT_STREAM),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}
