//! Simulated reply used when no provider stream could be opened.

use crate::api::models::StreamChunk;
use crate::core::GatewayError;
use async_stream::stream;
use futures::stream::Stream;
use std::time::Duration;

/// Emits a fixed explanatory message as a paced sequence of content chunks.
#[derive(Debug, Clone, Copy)]
pub struct FallbackEmitter {
    delay: Duration,
}

impl FallbackEmitter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    /// The message shown to the user for `err`.
    pub fn message_for(err: &GatewayError) -> String {
        format!(
            "Model call failed, using simulated reply: {}\n\nPlease check the configuration and network connection.",
            err
        )
    }

    /// Split on whitespace; every token but the last keeps a trailing space.
    pub fn tokens(message: &str) -> Vec<String> {
        let words: Vec<&str> = message.split_whitespace().collect();
        let last = words.len().saturating_sub(1);
        words
            .iter()
            .enumerate()
            .map(|(i, word)| {
                if i < last {
                    format!("{} ", word)
                } else {
                    word.to_string()
                }
            })
            .collect()
    }

    /// Chunks for `err` without pacing. The last one is finished.
    pub fn chunks(err: &GatewayError) -> Vec<StreamChunk> {
        let tokens = Self::tokens(&Self::message_for(err));
        let last = tokens.len().saturating_sub(1);
        tokens
            .into_iter()
            .enumerate()
            .map(|(i, token)| StreamChunk::content(token, i == last))
            .collect()
    }

    /// Paced fallback stream. Cannot fail.
    pub fn emit(&self, err: &GatewayError) -> impl Stream<Item = StreamChunk> + Send + 'static {
        let chunks = Self::chunks(err);
        let delay = self.delay;

        stream! {
            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield chunk;
            }
        }
    }
}
