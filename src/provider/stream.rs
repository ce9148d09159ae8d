//! Provider event stream decoding.
//!
//! Providers answer with `data: {json}` lines terminated by `data: [DONE]`.
//! [`LineBuffer`] reassembles lines split across network reads,
//! [`DeltaDecoder`] turns each line into [`StreamChunk`]s, and
//! [`open_event_stream`] drives both over a single HTTP response.

use super::{ChunkStream, ProviderKind};
use crate::api::models::StreamChunk;
use crate::core::{get_request_id, GatewayError, Result};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";
const ERROR_BODY_LIMIT: usize = 200;

// ============================================================================
// Line Buffer
// ============================================================================

/// Splits a byte stream into lines.
///
/// Works on raw bytes so multi-byte UTF-8 sequences split across reads are
/// decoded only once the whole line has arrived.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them, without terminators.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(
                String::from_utf8_lossy(&line)
                    .trim_end_matches(&['\r', '\n'][..])
                    .to_string(),
            );
        }
        lines
    }

    /// Take the trailing partial line, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(
            String::from_utf8_lossy(&rest)
                .trim_end_matches('\r')
                .to_string(),
        )
    }
}

// ============================================================================
// Delta Decoder
// ============================================================================

/// Turns provider event lines into chunks.
///
/// Tracks just enough state to guarantee one terminating content chunk and,
/// with reasoning enabled, one closing thinking chunk after it.
#[derive(Debug)]
pub struct DeltaDecoder {
    provider: ProviderKind,
    effective_thinking: bool,
    content_finished: bool,
    done: bool,
}

impl DeltaDecoder {
    pub fn new(provider: ProviderKind, effective_thinking: bool) -> Self {
        Self {
            provider,
            effective_thinking,
            content_finished: false,
            done: false,
        }
    }

    /// `true` once the sentinel (or end of input) was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_content_finished(&self) -> bool {
        self.content_finished
    }

    /// Decode one line. Non-data lines, malformed JSON and deltas without
    /// choices produce nothing.
    pub fn decode_line(&mut self, line: &str) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }

        let Some(data) = line.trim().strip_prefix(DATA_PREFIX) else {
            return Vec::new();
        };
        let data = data.trim();

        if data == DONE_SENTINEL {
            return self.finish();
        }
        if data.is_empty() || self.content_finished {
            return Vec::new();
        }

        let event: Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                let err = GatewayError::from(e);
                tracing::warn!(
                    request_id = %get_request_id(),
                    provider = %self.provider,
                    error = %err,
                    "Skipping malformed provider event"
                );
                return Vec::new();
            }
        };

        let Some(choice) = event
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return Vec::new();
        };

        let delta = choice.get("delta");
        let finished = choice
            .get("finish_reason")
            .map(|reason| !reason.is_null())
            .unwrap_or(false);

        let mut chunks = Vec::new();

        if self.effective_thinking {
            if let Some(reasoning) = delta
                .and_then(|d| d.get("reasoning_content"))
                .and_then(Value::as_str)
            {
                chunks.push(StreamChunk::thinking(reasoning, false));
            }
        }

        match delta.and_then(|d| d.get("content")).and_then(Value::as_str) {
            Some(content) => chunks.push(StreamChunk::content(content, finished)),
            None if finished => chunks.push(StreamChunk::content("", true)),
            None => {}
        }

        if finished {
            self.content_finished = true;
        }

        chunks
    }

    /// Close the stream: emit the content terminator if none was seen, then
    /// close the thinking channel when reasoning is enabled.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }
        self.done = true;

        let mut chunks = Vec::new();
        if !self.content_finished {
            self.content_finished = true;
            chunks.push(StreamChunk::content("", true));
        }
        if self.effective_thinking {
            chunks.push(StreamChunk::thinking("", true));
        }
        chunks
    }
}

// ============================================================================
// Stream Driver
// ============================================================================

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// A prepared provider call.
pub struct EventStreamRequest {
    pub provider: ProviderKind,
    pub request: reqwest::RequestBuilder,
    pub timeout_secs: u64,
    pub effective_thinking: bool,
}

enum Phase {
    Connect(reqwest::RequestBuilder),
    Reading(ByteStream),
    Done,
}

struct DriverState {
    phase: Phase,
    provider: ProviderKind,
    timeout_secs: u64,
    lines: LineBuffer,
    decoder: DeltaDecoder,
    pending: VecDeque<StreamChunk>,
}

/// Send the request on first poll and stream decoded chunks.
///
/// `timeout_secs` bounds the wait for response headers and then each gap
/// between body reads. Open failures are yielded as a single `Err`. Read
/// failures after that become one error chunk. Dropping the stream drops the response and closes
/// the connection.
pub fn open_event_stream(call: EventStreamRequest) -> ChunkStream {
    let state = DriverState {
        phase: Phase::Connect(call.request),
        provider: call.provider,
        timeout_secs: call.timeout_secs,
        lines: LineBuffer::new(),
        decoder: DeltaDecoder::new(call.provider, call.effective_thinking),
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }

            match std::mem::replace(&mut state.phase, Phase::Done) {
                Phase::Done => return None,
                Phase::Connect(request) => {
                    match connect(request, state.provider, state.timeout_secs).await {
                        Ok(body) => state.phase = Phase::Reading(body),
                        Err(e) => return Some((Err(e), state)),
                    }
                }
                Phase::Reading(mut body) => match next_read(&mut body, state.timeout_secs).await {
                    Some(Ok(bytes)) => {
                        for line in state.lines.push(&bytes) {
                            let chunks = state.decoder.decode_line(&line);
                            state.pending.extend(chunks);
                        }
                        if !state.decoder.is_done() {
                            state.phase = Phase::Reading(body);
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(
                            request_id = %get_request_id(),
                            provider = %state.provider,
                            error = %err,
                            "Provider stream failed mid-response"
                        );
                        if state.decoder.is_content_finished() {
                            state.pending.extend(state.decoder.finish());
                        } else {
                            state.pending.push_back(StreamChunk::error(format!(
                                "{} API error: {}",
                                state.provider, err
                            )));
                        }
                    }
                    None => {
                        if let Some(line) = state.lines.flush() {
                            let chunks = state.decoder.decode_line(&line);
                            state.pending.extend(chunks);
                        }
                        if !state.decoder.is_done() {
                            tracing::debug!(
                                provider = %state.provider,
                                "Provider stream ended without sentinel"
                            );
                            state.pending.extend(state.decoder.finish());
                        }
                    }
                },
            }
        }
    }))
}

/// Wait for the next body read. The timeout applies to the gap between
/// reads, not to the whole response.
async fn next_read(body: &mut ByteStream, timeout_secs: u64) -> Option<Result<Bytes>> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), body.next()).await {
        Ok(Some(Ok(bytes))) => Some(Ok(bytes)),
        Ok(Some(Err(e))) => Some(Err(GatewayError::from_transport(e, timeout_secs))),
        Ok(None) => None,
        Err(_) => Some(Err(GatewayError::Timeout(timeout_secs))),
    }
}

async fn connect(
    request: reqwest::RequestBuilder,
    provider: ProviderKind,
    timeout_secs: u64,
) -> Result<ByteStream> {
    let response = tokio::time::timeout(Duration::from_secs(timeout_secs), request.send())
        .await
        .map_err(|_| GatewayError::Timeout(timeout_secs))?
        .map_err(|e| GatewayError::from_transport(e, timeout_secs))?;

    let status = response.status();
    if !status.is_success() {
        let body = tokio::time::timeout(Duration::from_secs(timeout_secs), response.text())
            .await
            .ok()
            .and_then(|text| text.ok())
            .unwrap_or_default();
        tracing::warn!(
            request_id = %get_request_id(),
            provider = %provider,
            status = %status.as_u16(),
            "Provider rejected streaming request"
        );
        return Err(GatewayError::UpstreamStatus {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        });
    }

    Ok(Box::pin(response.bytes_stream()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ContentType;
    use pretty_assertions::assert_eq;

    fn decode_all(decoder: &mut DeltaDecoder, lines: &[&str]) -> Vec<StreamChunk> {
        lines
            .iter()
            .flat_map(|line| decoder.decode_line(line))
            .collect()
    }

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        assert_eq!(buffer.push(b":1}\r\ndata: [DO"), vec!["data: {\"a\":1}"]);
        assert_eq!(buffer.push(b"NE]\n\n"), vec!["data: [DONE]", ""]);
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_line_buffer_keeps_multibyte_characters_across_reads() {
        let mut buffer = LineBuffer::new();
        let text = "data: 你好\n".as_bytes();
        assert!(buffer.push(&text[..8]).is_empty());
        assert_eq!(buffer.push(&text[8..]), vec!["data: 你好"]);
    }

    #[test]
    fn test_line_buffer_flush_returns_partial_line() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"data: [DONE]");
        assert_eq!(buffer.flush().as_deref(), Some("data: [DONE]"));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_content_deltas_then_sentinel() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Glm, false);
        let chunks = decode_all(
            &mut decoder,
            &[
                r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
                "",
                r#"data: {"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
            ],
        );

        assert_eq!(
            chunks,
            vec![
                StreamChunk::content("Hel", false),
                StreamChunk::content("lo", true),
            ]
        );
        assert!(decoder.is_done());
    }

    #[test]
    fn test_finish_reason_without_content_emits_empty_terminator() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Glm, false);
        let chunks = decode_all(
            &mut decoder,
            &[
                r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
            ],
        );

        assert_eq!(
            chunks,
            vec![
                StreamChunk::content("Hi", false),
                StreamChunk::content("", true),
            ]
        );
    }

    #[test]
    fn test_sentinel_without_finish_reason_still_terminates() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Glm, false);
        let chunks = decode_all(
            &mut decoder,
            &[
                r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
                "data: [DONE]",
            ],
        );
        assert_eq!(chunks.last(), Some(&StreamChunk::content("", true)));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Kimi, false);
        let chunks = decode_all(
            &mut decoder,
            &[
                "data: {not json",
                r#"data: {"choices":[{"delta":{"content":"ok"},"finish_reason":"stop"}]}"#,
            ],
        );
        assert_eq!(chunks, vec![StreamChunk::content("ok", true)]);
    }

    #[test]
    fn test_non_data_lines_and_empty_choices_are_ignored() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Kimi, false);
        let chunks = decode_all(
            &mut decoder,
            &[
                ": keep-alive",
                "event: message",
                r#"data: {"choices":[],"usage":{"total_tokens":12}}"#,
                r#"data: {"id":"x"}"#,
            ],
        );
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_empty_content_string_is_relayed() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Glm, false);
        let chunks = decoder.decode_line(r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#);
        assert_eq!(chunks, vec![StreamChunk::content("", false)]);
    }

    #[test]
    fn test_reasoning_ignored_without_effective_thinking() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Kimi, false);
        let chunks = decode_all(
            &mut decoder,
            &[
                r#"data: {"choices":[{"delta":{"reasoning_content":"let me think"}}]}"#,
                r#"data: {"choices":[{"delta":{"content":"42"},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
            ],
        );

        assert!(chunks
            .iter()
            .all(|c| c.content_type != ContentType::Thinking));
        assert_eq!(chunks, vec![StreamChunk::content("42", true)]);
    }

    #[test]
    fn test_thinking_channel_closes_after_content() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Kimi, true);
        let chunks = decode_all(
            &mut decoder,
            &[
                r#"data: {"choices":[{"delta":{"reasoning_content":"step "}}]}"#,
                r#"data: {"choices":[{"delta":{"reasoning_content":" "}}]}"#,
                r#"data: {"choices":[{"delta":{"content":"42"},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
            ],
        );

        assert_eq!(
            chunks,
            vec![
                StreamChunk::thinking("step ", false),
                StreamChunk::thinking(" ", false),
                StreamChunk::content("42", true),
                StreamChunk::thinking("", true),
            ]
        );
    }

    #[test]
    fn test_deltas_after_finish_are_ignored() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Glm, false);
        let chunks = decode_all(
            &mut decoder,
            &[
                r#"data: {"choices":[{"delta":{"content":"a"},"finish_reason":"stop"}]}"#,
                r#"data: {"choices":[{"delta":{"content":"b"},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
                r#"data: {"choices":[{"delta":{"content":"c"}}]}"#,
            ],
        );
        assert_eq!(chunks, vec![StreamChunk::content("a", true)]);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut decoder = DeltaDecoder::new(ProviderKind::Glm, true);
        assert_eq!(decoder.finish().len(), 2);
        assert!(decoder.finish().is_empty());
        assert!(decoder.decode_line("data: [DONE]").is_empty());
    }
}
