// Wire types for a single turn request (POST /chat body).

use serde::{Deserialize, Serialize};

/// One line of prior dialogue as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub agent_id: String,
    pub content: String,
}

/// A request for the next line from `next_agent_id`.
///
/// Clients resend the whole history every turn; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub scenario_id: String,
    pub next_agent_id: String,
    /// Everyone currently in the scene. May include the speaker.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}
