// Items produced by the relay for one turn.

use std::time::Duration;

use thiserror::Error;

/// Terminal failures. Each one ends the turn's stream; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Upstream answered with a non-2xx status.
    #[error("[API Error {status}]: {body}")]
    Status { status: u16, body: String },

    /// Connection or read failure after the request was issued.
    #[error("[Backend Error: {0}]")]
    Transport(String),

    /// No response head, or no further body bytes, within the bound.
    #[error("[Backend Error: upstream timed out after {}s]", .0.as_secs_f32())]
    Timeout(Duration),
}

/// One piece of a streamed reply, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Incremental generated text. Never empty.
    Text(String),
    /// Last item of a failed turn.
    Error(RelayError),
}

impl Fragment {
    /// Flatten into the text written to the caller. Errors become their
    /// bracketed marker so callers can pattern-match them out of the body.
    pub fn into_text(self) -> String {
        match self {
            Fragment::Text(text) => text,
            Fragment::Error(err) => err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Fragment::Error(_))
    }
}
