//! NDJSON streaming support for chat responses.
//!
//! Each [`StreamChunk`] becomes one JSON object followed by `\n`. Two wire
//! representations are supported (see [`WireFormat`]):
//!
//! - legacy: `{"content": string, "finished": bool}`; while thinking mode is
//!   active `content` carries a JSON-encoded `{"content","type","finished"}`
//! - typed: `{"content": string, "type": string, "finished": bool}`

use crate::api::models::StreamChunk;
use crate::core::WireFormat;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Encode one chunk as an NDJSON line, including the trailing newline.
pub fn encode_chunk(chunk: &StreamChunk, format: WireFormat, thinking_active: bool) -> String {
    let typed = json!({
        "content": chunk.content,
        "type": chunk.content_type,
        "finished": chunk.finished,
    });

    let line = match format {
        WireFormat::Typed => typed,
        WireFormat::Legacy if thinking_active => json!({
            "content": typed.to_string(),
            "finished": chunk.finished,
        }),
        WireFormat::Legacy => json!({
            "content": chunk.content,
            "finished": chunk.finished,
        }),
    };

    let mut encoded = line.to_string();
    encoded.push('\n');
    encoded
}

/// Map a chunk stream to encoded body frames.
pub fn encode_stream<S>(
    chunks: S,
    format: WireFormat,
    thinking_active: bool,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = StreamChunk> + Send,
{
    chunks.map(move |chunk| Ok(Bytes::from(encode_chunk(&chunk, format, thinking_active))))
}

/// Build the streaming HTTP response around an encoded body stream.
pub fn ndjson_response<S>(body: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
