// Streaming chat-completion relay.
//
// Sends one prompt to the configured upstream with `stream: true`, parses the
// `data: <json>` lines as they arrive, and forwards each non-empty delta as a
// `Fragment` over a bounded mpsc channel. The channel is the only buffer
// between the upstream connection and the caller, so a slow caller slows the
// upstream read. Dropping the receiving end releases the upstream connection.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::fragment::{Fragment, RelayError};
use crate::sse::{parse_event_line, LineBuffer, LineEvent};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fragments allowed in flight between the upstream reader and the caller.
const FRAGMENT_BUFFER: usize = 16;

/// Single-pass stream of fragments for one turn.
pub type FragmentStream = ReceiverStream<Fragment>;

// ---------------------------------------------------------------------------
// UpstreamConfig
// ---------------------------------------------------------------------------

/// Where and how to reach the completion service. Fixed for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Full chat-completions URL, e.g. `https://api.openai.com/v1/chat/completions`.
    pub url: String,
    /// Sent as a bearer token when present and non-empty.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Bound on connecting, on waiting for the response head, and on each
    /// subsequent body read.
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// RelayOutcome
// ---------------------------------------------------------------------------

/// How a relay run ended. Only used for logging and tests; the caller sees
/// the fragments themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// `data: [DONE]` was received.
    Done,
    /// The upstream body ended without the sentinel.
    Ended,
    /// An error fragment was emitted.
    Failed,
    /// The receiver was dropped before the stream finished.
    Cancelled,
}

// ---------------------------------------------------------------------------
// RelayClient
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle to the upstream completion service.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    config: Arc<UpstreamConfig>,
}

impl RelayClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Start streaming a completion for `prompt`.
    ///
    /// The request is driven by a spawned task; the returned stream yields
    /// fragments in arrival order and ends after `[DONE]`, the end of the
    /// upstream body, or a single error fragment. Dropping the stream stops
    /// the task and closes the upstream connection.
    pub fn relay(&self, prompt: String) -> FragmentStream {
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let client = self.clone();
        tokio::spawn(async move {
            let outcome = client.stream_completion(&prompt, tx).await;
            debug!(?outcome, "relay finished");
        });
        ReceiverStream::new(rx)
    }

    /// Send the completion request and forward fragments over `tx` until the
    /// stream ends, fails, or the receiver is dropped.
    pub async fn stream_completion(&self, prompt: &str, tx: mpsc::Sender<Fragment>) -> RelayOutcome {
        let mut request = self.http.post(&self.config.url).json(&self.request_body(prompt));
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let timeout = self.config.timeout;
        let sent = tokio::select! {
            _ = tx.closed() => return RelayOutcome::Cancelled,
            sent = tokio::time::timeout(timeout, request.send()) => sent,
        };

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, "upstream request failed");
                return send_error(&tx, RelayError::Transport(e.to_string())).await;
            }
            Err(_) => {
                warn!(?timeout, "upstream did not respond in time");
                return send_error(&tx, RelayError::Timeout(timeout)).await;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = match tokio::time::timeout(timeout, response.text()).await {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    warn!(status = status.as_u16(), error = %e, "failed to read upstream rejection body");
                    return send_error(&tx, RelayError::Transport(e.to_string())).await;
                }
                Err(_) => {
                    warn!(status = status.as_u16(), ?timeout, "upstream rejection body stalled");
                    return send_error(&tx, RelayError::Timeout(timeout)).await;
                }
            };
            warn!(status = status.as_u16(), %body, "upstream rejected request");
            return send_error(
                &tx,
                RelayError::Status {
                    status: status.as_u16(),
                    body,
                },
            )
            .await;
        }

        debug!(status = status.as_u16(), "upstream stream opened");
        relay_body(Box::pin(response.bytes_stream()), timeout, &tx).await
    }

    pub(crate) fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": true,
        })
    }
}

// ---------------------------------------------------------------------------
// Body parsing
// ---------------------------------------------------------------------------

/// Drive line parsing over any chunked byte stream, forwarding text deltas
/// over `tx` in order.
///
/// A read error, a read that takes longer than `read_timeout`, or a line that
/// outgrows the line buffer produces one trailing error fragment. Malformed
/// lines are skipped.
pub async fn relay_body<S, B, E>(
    mut body: S,
    read_timeout: Duration,
    tx: &mpsc::Sender<Fragment>,
) -> RelayOutcome
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut lines = LineBuffer::default();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => return RelayOutcome::Cancelled,
            next = tokio::time::timeout(read_timeout, body.next()) => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                warn!(error = %e, "upstream read failed mid-stream");
                return send_error(tx, RelayError::Transport(e.to_string())).await;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(?read_timeout, "upstream stalled mid-stream");
                return send_error(tx, RelayError::Timeout(read_timeout)).await;
            }
        };

        for line in lines.push(chunk.as_ref()) {
            if let Some(outcome) = forward_line(&line, tx).await {
                return outcome;
            }
        }
        if let Err(e) = lines.check_limit() {
            warn!(error = %e, "upstream line too long");
            return send_error(tx, RelayError::Transport(e.to_string())).await;
        }
    }

    if let Some(line) = lines.finish() {
        if let Some(outcome) = forward_line(&line, tx).await {
            return outcome;
        }
    }

    debug!("upstream body ended without [DONE]");
    RelayOutcome::Ended
}

/// Handle one line. Returns `Some` when the relay should stop.
async fn forward_line(line: &str, tx: &mpsc::Sender<Fragment>) -> Option<RelayOutcome> {
    match parse_event_line(line) {
        LineEvent::Text(text) => {
            if tx.send(Fragment::Text(text)).await.is_err() {
                // Receiver dropped; abort stream.
                return Some(RelayOutcome::Cancelled);
            }
            None
        }
        LineEvent::Done => Some(RelayOutcome::Done),
        LineEvent::Malformed => {
            debug!(line, "discarding malformed upstream line");
            None
        }
        LineEvent::Ignored => None,
    }
}

async fn send_error(tx: &mpsc::Sender<Fragment>, err: RelayError) -> RelayOutcome {
    if tx.send(Fragment::Error(err)).await.is_err() {
        return RelayOutcome::Cancelled;
    }
    RelayOutcome::Failed
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
