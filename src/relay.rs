//! SSE completion stream → plain text relay.
//!
//! The upstream provider sends server-sent events whose `data:` payloads are
//! JSON chunks carrying `choices[0].delta.content`, terminated by
//! `data: [DONE]`. The relay forwards only the delta text, as UTF-8 bytes,
//! as soon as each line is complete.
//!
//! Line framing works on raw bytes: a line is only decoded once its `\n`
//! arrived, so a multi-byte character split across two network chunks is
//! never broken.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// One decoded upstream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Delta(String),
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental SSE line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the events of every line completed by them.
    /// The unterminated tail stays buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<RelayEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let line = &self.buffer[consumed..consumed + pos];
            consumed += pos + 1;
            if let Some(event) = parse_line(&String::from_utf8_lossy(line)) {
                let done = event == RelayEvent::Done;
                events.push(event);
                if done {
                    break;
                }
            }
        }
        self.buffer.drain(..consumed);
        events
    }

    /// Decode whatever is left once the inbound stream has ended.
    pub fn finish(&mut self) -> Vec<RelayEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

/// Decode one SSE line. Non-`data:` lines, malformed payloads and chunks
/// without delta text yield `None`.
pub fn parse_line(line: &str) -> Option<RelayEvent> {
    let payload = line.trim().strip_prefix("data:")?.trim_start();
    if payload == "[DONE]" {
        return Some(RelayEvent::Done);
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty())
            .map(RelayEvent::Delta),
        Err(e) => {
            debug!(error = %e, "skipping malformed stream event");
            None
        }
    }
}

/// Relay an upstream SSE body as a stream of delta text bytes.
///
/// Ends cleanly on `[DONE]` (dropping anything after it) or when the inbound
/// stream ends. An inbound read failure yields an error carrying the upstream
/// message, and no inbound chunk within `idle_timeout` yields a `TimedOut`
/// error. Either error is the last item.
pub fn relay<S, E>(
    inbound: S,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut inbound = Box::pin(inbound);
        let mut decoder = SseDecoder::new();

        'relay: loop {
            let next = match tokio::time::timeout(idle_timeout, inbound.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(timeout_secs = idle_timeout.as_secs(), "completion stream went idle");
                    yield Err(io::Error::new(io::ErrorKind::TimedOut, "completion stream idle"));
                    break;
                }
            };

            let (events, ended) = match next {
                Some(Ok(chunk)) => (decoder.push(&chunk), false),
                Some(Err(e)) => {
                    warn!(error = %e, "completion stream read failed");
                    yield Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("completion stream interrupted: {}", e),
                    ));
                    break;
                }
                None => (decoder.finish(), true),
            };

            for event in events {
                match event {
                    RelayEvent::Delta(text) => yield Ok(Bytes::from(text)),
                    RelayEvent::Done => break 'relay,
                }
            }

            if ended {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        let owned: Vec<Result<Bytes, io::Error>> =
            parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect();
        stream::iter(owned)
    }

    async fn collect(inbound: impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static) -> String {
        let out: Vec<Bytes> = relay(inbound, Duration::from_secs(5))
            .map(|r| r.unwrap())
            .collect()
            .await;
        String::from_utf8(out.concat()).unwrap()
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[test]
    fn parse_line_variants() {
        assert_eq!(parse_line("data: [DONE]"), Some(RelayEvent::Done));
        assert_eq!(parse_line("  data:[DONE]  "), Some(RelayEvent::Done));
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            Some(RelayEvent::Delta("Hi".into()))
        );
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("event: message"), None);
        assert_eq!(parse_line("data: {not json"), None);
        assert_eq!(parse_line(r#"data: {"choices":[{"delta":{"content":null}}]}"#), None);
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), None);
    }

    #[test]
    fn decoder_keeps_partial_line() {
        let mut decoder = SseDecoder::new();
        let line = delta("abc");
        let (head, tail) = line.as_bytes().split_at(10);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec![RelayEvent::Delta("abc".into())]);
    }

    #[test]
    fn decoder_stops_at_done() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}data: [DONE]\n{}", delta("a"), delta("b"));
        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![RelayEvent::Delta("a".into()), RelayEvent::Done]
        );
    }

    #[tokio::test]
    async fn relays_delta_then_closes_on_done() {
        let first = delta("Hi");
        let body = collect(chunks(&[first.as_bytes(), b"data: [DONE]\n"])).await;
        assert_eq!(body, "Hi");
    }

    #[tokio::test]
    async fn malformed_line_does_not_interrupt() {
        let input = format!("{}data: {{oops\n{}data: [DONE]\n", delta("A"), delta("B"));
        let body = collect(chunks(&[input.as_bytes()])).await;
        assert_eq!(body, "AB");
    }

    #[tokio::test]
    async fn ends_cleanly_without_done() {
        let a = delta("x");
        let b = delta("y");
        let body = collect(chunks(&[a.as_bytes(), b.as_bytes()])).await;
        assert_eq!(body, "xy");
    }

    #[tokio::test]
    async fn flushes_unterminated_last_line() {
        let a = delta("x");
        let last = r#"data: {"choices":[{"delta":{"content":"z"}}]}"#;
        let body = collect(chunks(&[a.as_bytes(), last.as_bytes()])).await;
        assert_eq!(body, "xz");
    }

    #[tokio::test]
    async fn multibyte_split_across_chunks() {
        let line = delta("héllo wörld");
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;
        let body = collect(chunks(&[&bytes[..split], &bytes[split..]])).await;
        assert_eq!(body, "héllo wörld");
    }

    #[tokio::test]
    async fn read_error_ends_stream_with_error() {
        let inbound = stream::iter(vec![
            Ok(Bytes::from(delta("ok"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from(delta("never"))),
        ]);
        let out: Vec<_> = relay(inbound, Duration::from_secs(5)).collect().await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &Bytes::from("ok"));
        let err = out[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("reset"));
    }

    #[tokio::test]
    async fn idle_upstream_times_out() {
        let inbound = stream::pending::<Result<Bytes, io::Error>>();
        let out: Vec<_> = relay(inbound, Duration::from_millis(20)).collect().await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap_err().kind(), io::ErrorKind::TimedOut);
    }
}
