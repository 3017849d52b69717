// Line framing and payload parsing for the upstream `data: <json>` stream.
//
// The upstream speaks an OpenAI-style chat-completion stream:
//
//   data: {"choices":[{"delta":{"content":"Hel"}}]}
//
//   data: {"choices":[{"delta":{"content":"lo"}}]}
//
//   data: [DONE]
//
// Only lines beginning with the literal `data: ` prefix are considered. A
// payload that fails to parse is noise, not a fatal error.

use serde_json::Value;
use thiserror::Error;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Most bytes held waiting for a newline before the stream is abandoned.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// What a single upstream line means for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Blank, not a `data: ` line, no choices, or empty content.
    Ignored,
    /// A `data: ` line whose payload is not valid JSON.
    Malformed,
    /// The `[DONE]` sentinel.
    Done,
    /// Non-empty incremental content from `choices[0].delta.content`.
    Text(String),
}

/// Classify one line (without its trailing newline).
pub fn parse_event_line(line: &str) -> LineEvent {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return LineEvent::Ignored;
    }
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Ignored;
    };

    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        return LineEvent::Done;
    }

    let Ok(event) = serde_json::from_str::<Value>(payload) else {
        return LineEvent::Malformed;
    };

    match parse_delta_content(&event) {
        Some(text) if !text.is_empty() => LineEvent::Text(text.to_string()),
        _ => LineEvent::Ignored,
    }
}

/// Extract `choices[0].delta.content`.
///
/// Expected shape: `{ "choices": [ { "delta": { "content": "..." } } ] }`
fn parse_delta_content(event: &Value) -> Option<&str> {
    event
        .get("choices")?
        .as_array()?
        .first()?
        .get("delta")?
        .get("content")?
        .as_str()
}

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("upstream sent more than {limit} bytes without a newline")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Reassembles `\n`-terminated lines from arbitrarily split byte chunks.
///
/// Works on bytes so a multi-byte character split across two chunks is
/// decoded only once the whole line has arrived.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }
}

impl LineBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
        }
    }

    /// Fails once the unterminated tail outgrows the limit. The tail is
    /// discarded so the buffer does not keep holding it.
    pub fn check_limit(&mut self) -> Result<(), LineTooLong> {
        if self.pending.len() > self.limit {
            self.pending = Vec::new();
            return Err(LineTooLong { limit: self.limit });
        }
        Ok(())
    }

    /// Append a chunk and drain every complete line it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Take whatever is left once the body has ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
        )
    }

    #[test]
    fn parses_delta_content() {
        assert_eq!(
            parse_event_line(&delta_line("Hello")),
            LineEvent::Text("Hello".to_string())
        );
    }

    #[test]
    fn done_sentinel() {
        assert_eq!(parse_event_line("data: [DONE]"), LineEvent::Done);
        assert_eq!(parse_event_line("data: [DONE]  "), LineEvent::Done);
        assert_eq!(parse_event_line("data: [DONE]\r"), LineEvent::Done);
    }

    #[test]
    fn blank_lines_ignored() {
        assert_eq!(parse_event_line(""), LineEvent::Ignored);
        assert_eq!(parse_event_line("   "), LineEvent::Ignored);
        assert_eq!(parse_event_line("\r"), LineEvent::Ignored);
    }

    #[test]
    fn requires_literal_data_prefix() {
        assert_eq!(parse_event_line("event: message"), LineEvent::Ignored);
        assert_eq!(parse_event_line(": keep-alive"), LineEvent::Ignored);
        // No space after the colon.
        assert_eq!(
            parse_event_line(r#"data:{"choices":[{"delta":{"content":"x"}}]}"#),
            LineEvent::Ignored
        );
        // Leading whitespace.
        assert_eq!(parse_event_line(&format!(" {}", delta_line("x"))), LineEvent::Ignored);
    }

    #[test]
    fn non_json_payload_is_malformed() {
        assert_eq!(parse_event_line("data: not-json"), LineEvent::Malformed);
        assert_eq!(parse_event_line("data: {broken"), LineEvent::Malformed);
    }

    #[test]
    fn missing_or_empty_choices_ignored() {
        assert_eq!(parse_event_line(r#"data: {"id":"x"}"#), LineEvent::Ignored);
        assert_eq!(parse_event_line(r#"data: {"choices":[]}"#), LineEvent::Ignored);
        assert_eq!(parse_event_line(r#"data: {"choices":"nope"}"#), LineEvent::Ignored);
        assert_eq!(parse_event_line(r#"data: {"choices":null}"#), LineEvent::Ignored);
    }

    #[test]
    fn empty_or_missing_content_ignored() {
        assert_eq!(parse_event_line(&delta_line("")), LineEvent::Ignored);
        assert_eq!(
            parse_event_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineEvent::Ignored
        );
        assert_eq!(
            parse_event_line(r#"data: {"choices":[{"delta":{"content":null}}]}"#),
            LineEvent::Ignored
        );
        assert_eq!(
            parse_event_line(r#"data: {"choices":[{"finish_reason":"stop"}]}"#),
            LineEvent::Ignored
        );
    }

    #[test]
    fn only_first_choice_is_used() {
        let line = r#"data: {"choices":[{"delta":{"content":"first"}},{"delta":{"content":"second"}}]}"#;
        assert_eq!(parse_event_line(line), LineEvent::Text("first".to_string()));
    }

    #[test]
    fn content_whitespace_is_preserved() {
        assert_eq!(
            parse_event_line(&delta_line(" world\n")),
            LineEvent::Text(" world\n".to_string())
        );
    }

    #[test]
    fn line_buffer_splits_on_newline() {
        let mut buf = LineBuffer::default();
        let lines = buf.push(b"data: a\n\ndata: b\n");
        assert_eq!(lines, vec!["data: a", "", "data: b"]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_reassembles_across_chunks() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"cho").is_empty());
        assert!(buf.push(b"ices\":[]}").is_empty());
        assert_eq!(buf.push(b"\ndata: x"), vec!["data: {\"choices\":[]}"]);
        assert_eq!(buf.finish(), Some("data: x".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_split_utf8_intact() {
        let text = "data: 雨\n".as_bytes();
        // Split inside the three-byte character.
        let (head, tail) = text.split_at(7);
        let mut buf = LineBuffer::default();
        assert!(buf.push(head).is_empty());
        assert_eq!(buf.push(tail), vec!["data: 雨"]);
    }

    #[test]
    fn line_buffer_rejects_unterminated_tail_over_limit() {
        let mut buf = LineBuffer::with_limit(8);
        assert_eq!(buf.push(b"data: a\n12345678"), vec!["data: a"]);
        assert_eq!(buf.check_limit(), Ok(()));

        assert!(buf.push(b"9").is_empty());
        assert_eq!(buf.check_limit(), Err(LineTooLong { limit: 8 }));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_limit_applies_to_tail_not_whole_chunk() {
        let mut buf = LineBuffer::with_limit(8);
        let lines = buf.push(b"data: a long complete line\nshort");
        assert_eq!(lines, vec!["data: a long complete line"]);
        assert_eq!(buf.check_limit(), Ok(()));
    }

    #[test]
    fn line_buffer_keeps_carriage_return_for_parser() {
        let mut buf = LineBuffer::default();
        let lines = buf.push(b"data: [DONE]\r\n");
        assert_eq!(lines, vec!["data: [DONE]\r"]);
        assert_eq!(parse_event_line(&lines[0]), LineEvent::Done);
    }
}
