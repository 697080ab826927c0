//! Codex event-stream parsing.
//!
//! Codex emits one JSON object per line on stdout. Only two event types
//! matter to the wrapper: `thread.started` carries the session id, and
//! `item.completed` with an `agent_message` item carries response text.
//! Everything else is logged and ignored, and a malformed line never takes
//! down the rest of the stream.

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::logging::TaskLog;
use crate::tail::truncate_message;

/// Longest accepted line; codex can emit multi-megabyte messages.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Bytes shown from a malformed line in the warning log.
const PARSE_EXCERPT_LIMIT: usize = 100;

/// One decoded line from the codex stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum CodexEvent {
    /// Session established; carries the id used for `resume`.
    #[serde(rename = "thread.started")]
    ThreadStarted {
        #[serde(default)]
        thread_id: Option<String>,
    },

    /// An output item finished; `agent_message` items carry response text.
    #[serde(rename = "item.completed")]
    ItemCompleted {
        #[serde(default)]
        item: Option<EventItem>,
    },

    /// Any other event type (fallback).
    #[serde(untagged)]
    Unknown(Value),
}

/// The `item` payload of an `item.completed` event.
#[derive(Debug, Deserialize)]
pub struct EventItem {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub text: TextContent,
}

/// Item text as codex actually sends it: a string, a list of fragments,
/// or something else entirely. Anything unrecognized normalizes to empty.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TextContent {
    Text(String),
    Parts(Vec<Value>),
    Other(Value),
}

impl Default for TextContent {
    fn default() -> Self {
        Self::Other(Value::Null)
    }
}

impl TextContent {
    /// Flatten to plain text: strings verbatim, lists concatenated in
    /// order with non-string elements dropped, anything else empty.
    pub fn normalized(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .concat(),
            Self::Other(_) => String::new(),
        }
    }
}

/// What survived the stream: the last non-empty agent message and the last
/// observed thread id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub message: String,
    pub thread_id: String,
}

/// Consume a codex stdout stream to EOF.
///
/// Later events overwrite earlier ones (a stream refines itself as it
/// goes). Decode failures and oversized lines are logged and never abort
/// the parse; read errors other than EOF terminate it with a warning.
/// With `echo_lines` set, every line is also logged with a
/// `CODEX_STDOUT: ` prefix, truncated.
pub async fn parse_stream<R>(reader: R, log: TaskLog, echo_lines: bool) -> StreamOutcome
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(64 * 1024, reader);
    let mut outcome = StreamOutcome::default();
    let mut line: Vec<u8> = Vec::new();
    let mut events = 0u64;

    loop {
        let (consumed, complete) = {
            let chunk = match reader.fill_buf().await {
                Ok(chunk) => chunk,
                Err(e) => {
                    log.warn(format!("read stdout error: {e}"));
                    break;
                }
            };
            if chunk.is_empty() {
                // EOF: a final line without a newline still counts.
                if !line.is_empty() {
                    process_line(&line, &mut outcome, &log, echo_lines, &mut events);
                }
                break;
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&chunk[..pos]);
                    (pos + 1, true)
                }
                None => {
                    line.extend_from_slice(chunk);
                    (chunk.len(), false)
                }
            }
        };
        reader.consume(consumed);

        if line.len() > MAX_LINE_BYTES {
            log.warn(format!(
                "read stdout error: line exceeds {MAX_LINE_BYTES} bytes"
            ));
            break;
        }
        if complete {
            process_line(&line, &mut outcome, &log, echo_lines, &mut events);
            line.clear();
        }
    }

    log.info(format!(
        "event stream complete: events={}, message_len={}, thread_id_found={}",
        events,
        outcome.message.len(),
        !outcome.thread_id.is_empty()
    ));
    outcome
}

fn process_line(
    raw: &[u8],
    outcome: &mut StreamOutcome,
    log: &TaskLog,
    echo_lines: bool,
    events: &mut u64,
) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if echo_lines {
        log.info(format!("CODEX_STDOUT: {}", truncate_message(text, 1000)));
    }
    *events += 1;

    let event: CodexEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(_) => {
            log.warn(format!(
                "failed to parse line: {}",
                truncate_message(text, PARSE_EXCERPT_LIMIT)
            ));
            return;
        }
    };

    match event {
        CodexEvent::ThreadStarted { thread_id } => {
            if let Some(thread_id) = thread_id {
                log.info(format!("thread.started event thread_id={thread_id}"));
                outcome.thread_id = thread_id;
            }
        }
        CodexEvent::ItemCompleted { item } => {
            let Some(item) = item else {
                log.info(format!("event #{events} item.completed without item"));
                return;
            };
            let normalized = item.text.normalized();
            log.info(format!(
                "item.completed event item_type={} message_len={}",
                item.kind,
                normalized.len()
            ));
            if item.kind == "agent_message" && !normalized.is_empty() {
                outcome.message = normalized;
            }
        }
        CodexEvent::Unknown(value) => {
            let kind = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            log.info(format!("event #{events} type={kind} ignored"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogHandle, TaskLog};

    fn quiet() -> TaskLog {
        TaskLog::new(LogHandle::disabled(), "")
    }

    async fn parse(input: &str) -> StreamOutcome {
        parse_stream(input.as_bytes(), quiet(), false).await
    }

    #[test]
    fn test_event_decoding() {
        let event: CodexEvent =
            serde_json::from_str(r#"{"type":"thread.started","thread_id":"t-1"}"#).unwrap();
        assert!(matches!(
            event,
            CodexEvent::ThreadStarted { thread_id: Some(id) } if id == "t-1"
        ));

        let event: CodexEvent = serde_json::from_str(
            r#"{"type":"item.completed","item":{"type":"agent_message","text":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(event, CodexEvent::ItemCompleted { item: Some(_) }));

        let event: CodexEvent =
            serde_json::from_str(r#"{"type":"turn.completed","usage":{}}"#).unwrap();
        assert!(matches!(event, CodexEvent::Unknown(_)));
    }

    #[test]
    fn test_text_normalization() {
        let text: TextContent = serde_json::from_str(r#""plain""#).unwrap();
        assert_eq!(text.normalized(), "plain");

        let text: TextContent = serde_json::from_str(r#"["a",1,"b",null,"c"]"#).unwrap();
        assert_eq!(text.normalized(), "abc");

        let text: TextContent = serde_json::from_str(r#"{"nested":true}"#).unwrap();
        assert_eq!(text.normalized(), "");

        assert_eq!(TextContent::default().normalized(), "");
    }

    #[tokio::test]
    async fn test_extracts_message_and_thread_id() {
        let outcome = parse(concat!(
            "{\"type\":\"thread.started\",\"thread_id\":\"t-9\"}\n",
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"answer\"}}\n",
        ))
        .await;

        assert_eq!(outcome.message, "answer");
        assert_eq!(outcome.thread_id, "t-9");
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let outcome = parse(concat!(
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"first\"}}\n",
            "{\"type\":\"thread.started\",\"thread_id\":\"old\"}\n",
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"second\"}}\n",
            "{\"type\":\"thread.started\",\"thread_id\":\"new\"}\n",
        ))
        .await;

        assert_eq!(outcome.message, "second");
        assert_eq!(outcome.thread_id, "new");
    }

    #[tokio::test]
    async fn test_empty_message_does_not_overwrite() {
        let outcome = parse(concat!(
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"kept\"}}\n",
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"\"}}\n",
        ))
        .await;

        assert_eq!(outcome.message, "kept");
    }

    #[tokio::test]
    async fn test_recovers_after_malformed_line() {
        // A truncated JSON line mid-stream must not lose later events.
        let outcome = parse(concat!(
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"before\"}}\n",
            "{\"type\":\"item.comp\n",
            "{\"type\":\"thread.started\",\"thread_id\":\"t\"}\n",
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"after\"}}\n",
        ))
        .await;

        assert_eq!(outcome.message, "after");
        assert_eq!(outcome.thread_id, "t");
    }

    #[tokio::test]
    async fn test_unrecognized_events_yield_empty_outcome() {
        let outcome = parse(concat!(
            "{\"type\":\"turn.started\"}\n",
            "{\"type\":\"item.started\",\"item\":{\"type\":\"reasoning\"}}\n",
        ))
        .await;

        assert_eq!(outcome, StreamOutcome::default());
    }

    #[tokio::test]
    async fn test_non_agent_items_ignored() {
        let outcome = parse(
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"reasoning\",\"text\":\"thinking\"}}\n",
        )
        .await;

        assert_eq!(outcome.message, "");
    }

    #[tokio::test]
    async fn test_item_missing_or_null_tolerated() {
        let outcome = parse(concat!(
            "{\"type\":\"item.completed\"}\n",
            "{\"type\":\"item.completed\",\"item\":null}\n",
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\"}}\n",
        ))
        .await;

        assert_eq!(outcome.message, "");
    }

    #[tokio::test]
    async fn test_blank_lines_and_final_line_without_newline() {
        let outcome = parse(concat!(
            "\n",
            "   \n",
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"tail\"}}",
        ))
        .await;

        assert_eq!(outcome.message, "tail");
    }

    #[tokio::test]
    async fn test_list_text_concatenated_in_order() {
        let outcome = parse(
            "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":[\"one \",\"two \",3,\"three\"]}}\n",
        )
        .await;

        assert_eq!(outcome.message, "one two three");
    }

    #[tokio::test]
    async fn test_line_at_limit_parses() {
        let prefix = "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"";
        let suffix = "\"}}";
        let pad = MAX_LINE_BYTES - prefix.len() - suffix.len();
        let line = format!("{prefix}{}{suffix}\n", "a".repeat(pad));
        assert_eq!(line.len(), MAX_LINE_BYTES + 1); // +1 for the newline

        let outcome = parse_stream(line.as_bytes(), quiet(), false).await;
        assert_eq!(outcome.message.len(), pad);
    }

    #[tokio::test]
    async fn test_line_over_limit_terminates_with_empty_message() {
        let prefix = "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"";
        let suffix = "\"}}";
        let pad = MAX_LINE_BYTES - prefix.len() - suffix.len() + 1;
        let line = format!("{prefix}{}{suffix}\n", "a".repeat(pad));

        let outcome = parse_stream(line.as_bytes(), quiet(), false).await;
        assert_eq!(outcome.message, "");
    }
}
