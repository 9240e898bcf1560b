use crate::chat::BackendChunk;
use crate::transforms::ThinkSpan;
use axum::response::sse::Event;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::sync::mpsc;

pub mod line_buffer;

pub use line_buffer::LineBuffer;

pub const SSE_DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

const ENVELOPE_KEYS: [&str; 4] = ["id", "object", "created", "model"];

/// Rewrites a backend chat-completion event stream for the caller.
///
/// Reasoning deltas are folded into `content` between `<think>` markers and
/// the `reasoning_content` field never leaves the gateway. Each instance
/// belongs to a single stream.
pub struct StreamTranscoder {
    lines: LineBuffer,
    span: ThinkSpan,
    show_reasoning: bool,
    envelope: Map<String, Value>,
    dropped: u64,
}

impl StreamTranscoder {
    pub fn new(show_reasoning: bool) -> Self {
        Self {
            lines: LineBuffer::new(),
            span: ThinkSpan::new(),
            show_reasoning,
            envelope: Map::new(),
            dropped: 0,
        }
    }

    /// Feeds one transport chunk; returns the `data:` payloads to forward, in
    /// order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for line in self.lines.push(chunk) {
            self.transcode_line(&line, &mut out);
        }
        out
    }

    /// Flushes a trailing unterminated line and closes a dangling `<think>`
    /// block. Call once the backend stream has ended cleanly.
    pub fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(line) = self.lines.take_remainder() {
            self.transcode_line(&line, &mut out);
        }
        self.close_span(&mut out);
        out
    }

    pub fn dropped_lines(&self) -> u64 {
        self.dropped
    }

    fn transcode_line(&mut self, line: &str, out: &mut Vec<String>) {
        let Some(data) = line.strip_prefix(SSE_DATA_PREFIX) else {
            return;
        };
        let data = data.trim();
        if data == DONE_SENTINEL {
            self.close_span(out);
            out.push(DONE_SENTINEL.to_string());
            return;
        }

        let mut chunk: BackendChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(err) => {
                self.dropped += 1;
                metrics::counter!("nimproxy_stream_lines_dropped_total").increment(1);
                tracing::debug!(error = %err, "dropping malformed stream event");
                return;
            }
        };
        self.remember_envelope(&chunk);

        let show_reasoning = self.show_reasoning;
        let Some(delta) = chunk.first_delta_mut() else {
            out.push(data.to_string());
            return;
        };
        let reasoning = delta.reasoning_content.take();
        let content = delta.content.clone().flatten();
        let had_fragment = content.is_some() || reasoning.is_some();

        let merged = self
            .span
            .merge(reasoning.as_deref(), content.as_deref(), show_reasoning);
        if !merged.is_empty() {
            delta.content = Some(Some(merged));
        } else if had_fragment {
            delta.content = Some(Some(String::new()));
        }

        match serde_json::to_string(&chunk) {
            Ok(payload) => out.push(payload),
            Err(err) => tracing::warn!(error = %err, "failed to serialize stream event"),
        }
    }

    fn remember_envelope(&mut self, chunk: &BackendChunk) {
        for key in ENVELOPE_KEYS {
            if let Some(value) = chunk.extra_body.get(key) {
                self.envelope.insert(key.to_string(), value.clone());
            }
        }
    }

    fn close_span(&mut self, out: &mut Vec<String>) {
        let Some(marker) = self.span.close() else {
            return;
        };
        let mut event = self.envelope.clone();
        event.insert(
            "choices".to_string(),
            json!([{ "index": 0, "delta": { "content": marker }, "finish_reason": Value::Null }]),
        );
        out.push(Value::Object(event).to_string());
    }
}

/// Drives `body` through `transcoder`, sending each payload to `tx` as an SSE
/// event as soon as it is produced.
///
/// Stops quietly when the caller goes away, the backend stream fails, or the
/// backend sends nothing for `idle_timeout`; once headers are out there is no
/// way left to report the error.
pub async fn forward_transcoded<S, E>(
    body: S,
    mut transcoder: StreamTranscoder,
    tx: mpsc::Sender<Event>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    loop {
        let next = match tokio::time::timeout(idle_timeout, body.next()).await {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(_) => {
                metrics::counter!("nimproxy_stream_idle_timeouts_total").increment(1);
                tracing::warn!(
                    idle_ms = idle_timeout.as_millis() as u64,
                    "backend stream stalled, closing downstream"
                );
                return;
            }
        };
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!(error = %err, "backend stream failed, closing downstream");
                return;
            }
        };
        for payload in transcoder.push(&chunk) {
            if tx.send(Event::default().data(payload)).await.is_err() {
                tracing::debug!("caller disconnected, abandoning stream");
                return;
            }
        }
    }
    for payload in transcoder.finish() {
        if tx.send(Event::default().data(payload)).await.is_err() {
            return;
        }
    }
    if transcoder.dropped_lines() > 0 {
        tracing::debug!(
            dropped = transcoder.dropped_lines(),
            "stream finished with malformed events"
        );
    }
}
